use crate::reconcile::stale::StaleReason;
use std::fmt;
use tracing::info;

/// One change made (or, in a dry run, that would be made)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    DeleteRule {
        rule: String,
        reason: StaleReason,
    },
    InsertRule {
        tag: String,
        rule: String,
    },
    RemoveNetwork {
        network: String,
        reason: StaleReason,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::DeleteRule { rule, reason } => write!(f, "delete rule {} ({})", rule, reason),
            Mutation::InsertRule { tag, rule } => write!(f, "insert rule {} [{}]", rule, tag),
            Mutation::RemoveNetwork { network, reason } => {
                write!(f, "remove network {} ({})", network, reason)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub mutations: Vec<Mutation>,
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// No change was needed
    pub fn is_converged(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn deletions(&self) -> usize {
        self.count(|m| matches!(m, Mutation::DeleteRule { .. }))
    }

    pub fn insertions(&self) -> usize {
        self.count(|m| matches!(m, Mutation::InsertRule { .. }))
    }

    pub fn removed_networks(&self) -> usize {
        self.count(|m| matches!(m, Mutation::RemoveNetwork { .. }))
    }

    pub fn deletions_for(&self, reason: StaleReason) -> usize {
        self.count(|m| matches!(m, Mutation::DeleteRule { reason: r, .. } if *r == reason))
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn log_summary(&self) {
        info!(
            dry_run = self.dry_run,
            deleted_rules = self.deletions(),
            inserted_rules = self.insertions(),
            removed_networks = self.removed_networks(),
            warnings = self.warnings.len(),
            "{}",
            if self.is_converged() {
                "Reconcile finished; already converged"
            } else if self.dry_run {
                "DRY-RUN: reconcile finished; changes listed above were not applied"
            } else {
                "Reconcile finished"
            }
        );
    }

    fn count(&self, predicate: impl Fn(&Mutation) -> bool) -> usize {
        self.mutations.iter().filter(|m| predicate(m)).count()
    }
}
