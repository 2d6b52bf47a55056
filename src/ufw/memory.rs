use crate::ufw::error::UfwError;
use crate::ufw::parser::{self, UfwStatus};
use crate::ufw::rule::{FirewallRule, Placement, RuleSpec};
use crate::ufw::{DeleteOutcome, RuleStore};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    status: UfwStatus,
    rules: Vec<FirewallRule>,
    deletions: usize,
    insertions: usize,
}

impl State {
    fn reindex(&mut self) {
        for (i, rule) in self.rules.iter_mut().enumerate() {
            rule.index = i + 1;
        }
    }

    fn first_v6(&self) -> usize {
        self.rules
            .iter()
            .position(|r| r.v6)
            .unwrap_or(self.rules.len())
    }
}

/// In-memory rule list with ufw's ordering semantics
///
/// IPv4 rules always precede IPv6 rules and indices are 1-based and
/// contiguous, so deleting rule N shifts every later rule up by one.
/// Used by tests and to simulate a dry run against a copy of the live list.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    state: Mutex<State>,
}

impl MemoryRuleStore {
    /// An active firewall with a deny-incoming default and no rules
    pub fn new() -> Self {
        Self::with_status(UfwStatus {
            active: true,
            default_incoming: Some("deny".to_string()),
        })
    }

    pub fn with_status(status: UfwStatus) -> Self {
        Self {
            state: Mutex::new(State {
                status,
                ..Default::default()
            }),
        }
    }

    pub fn from_rules(status: UfwStatus, rules: Vec<FirewallRule>) -> Self {
        let store = Self::with_status(status);
        {
            let mut state = store.lock();
            let (mut v4, v6): (Vec<_>, Vec<_>) = rules.into_iter().partition(|r| !r.v6);
            v4.extend(v6);
            state.rules = v4;
            state.reindex();
        }
        store
    }

    /// Seed from `ufw status numbered` output
    pub fn from_listing(status: UfwStatus, numbered: &str) -> Result<Self, UfwError> {
        Ok(Self::from_rules(status, parser::parse_numbered(numbered)?))
    }

    /// Add a rule the way `ufw` would for a plain add
    pub fn push(&self, rule: FirewallRule) {
        let mut state = self.lock();
        let position = if rule.v6 {
            state.rules.len()
        } else {
            state.first_v6()
        };
        state.rules.insert(position, rule);
        state.reindex();
    }

    pub fn rules(&self) -> Vec<FirewallRule> {
        self.lock().rules.clone()
    }

    pub fn deletions(&self) -> usize {
        self.lock().deletions
    }

    pub fn insertions(&self) -> usize {
        self.lock().insertions
    }

    pub fn mutation_count(&self) -> usize {
        let state = self.lock();
        state.deletions + state.insertions
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn status(&self) -> Result<UfwStatus, UfwError> {
        Ok(self.lock().status.clone())
    }

    async fn list_rules(&self) -> Result<Vec<FirewallRule>, UfwError> {
        Ok(self.rules())
    }

    async fn delete_by_index(&self, index: usize) -> Result<DeleteOutcome, UfwError> {
        let mut state = self.lock();
        if index == 0 || index > state.rules.len() {
            return Ok(DeleteOutcome::AlreadyGone);
        }
        state.rules.remove(index - 1);
        state.reindex();
        state.deletions += 1;
        Ok(DeleteOutcome::Deleted)
    }

    async fn insert(&self, spec: &RuleSpec, placement: Placement) -> Result<(), UfwError> {
        let mut state = self.lock();
        let first_v6 = state.first_v6();
        let position = match (placement, spec.v6()) {
            (Placement::Top, false) => 0,
            (Placement::Top, true) => first_v6,
            (Placement::Bottom, false) => first_v6,
            (Placement::Bottom, true) => state.rules.len(),
        };
        state.rules.insert(position, spec.to_rule(position + 1));
        state.reindex();
        state.insertions += 1;
        Ok(())
    }

    async fn raw_listing(&self) -> Result<String, UfwError> {
        let state = self.lock();
        Ok(parser::render_numbered(&state.status, &state.rules))
    }

    async fn raw_status(&self) -> Result<String, UfwError> {
        Ok(parser::render_status(&self.lock().status))
    }
}
