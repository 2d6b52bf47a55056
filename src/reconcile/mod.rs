pub mod backup;
pub mod error;
pub mod report;
pub mod stale;


use crate::docker::NetworkEngine;
use crate::docker::network::{self, NetworkSpec};
use crate::host::InterfaceLister;
use crate::policy::{DesiredAction, Phase, PolicyEntry, PolicyTable, find_matching};
use crate::reconcile::backup::BackupWriter;
use crate::reconcile::error::ReconcileError;
use crate::reconcile::report::{Mutation, ReconcileReport};
use crate::reconcile::stale::{
    NetworkVerdict, ResourceKind, StaleReason, StaleResourceCandidate, StaleResourceDetector,
};
use crate::ufw::rule::{FirewallRule, Placement, RuleSpec};
use crate::ufw::{DeleteOutcome, RuleStore};
use bon::bon;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Brings the host firewall and Docker networks in line with a policy table
///
/// Every deletion works from a fresh snapshot and removes the highest
/// matching index, so no index is ever reused after a mutation. In dry-run
/// mode the store must be a simulation (see `MemoryRuleStore`); networks
/// are never removed.
pub struct Reconciler {
    store: Arc<dyn RuleStore>,
    engine: Arc<dyn NetworkEngine>,
    interfaces: Box<dyn InterfaceLister>,
    detector: StaleResourceDetector,
    expected_network: NetworkSpec,
    owner: String,
    dry_run: bool,
    backup: Option<BackupWriter>,
    backup_attempted: bool,
}

#[bon]
impl Reconciler {
    #[builder]
    pub fn new(
        store: Arc<dyn RuleStore>,
        engine: Arc<dyn NetworkEngine>,
        interfaces: Box<dyn InterfaceLister>,
        detector: StaleResourceDetector,
        expected_network: NetworkSpec,
        #[builder(into)] owner: String,
        #[builder(default)] dry_run: bool,
        backup: Option<BackupWriter>,
    ) -> Self {
        Self {
            store,
            engine,
            interfaces,
            detector,
            expected_network,
            owner,
            dry_run,
            backup,
            backup_attempted: false,
        }
    }

    /// Full run: preflight, stale interface rules, policy phases, then
    /// stale networks
    pub async fn run(&mut self, policy: &PolicyTable) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(self.dry_run);

        let live_interfaces = self.preflight(&mut report).await?;
        self.remove_stale_interface_rules(&live_interfaces, &mut report)
            .await?;
        self.apply_policy(policy, &mut report).await?;
        self.remove_stale_networks(&mut report).await?;

        report.log_summary();
        Ok(report)
    }

    /// Only the policy phases, without host checks or network cleanup
    pub async fn reconcile(&mut self, policy: &PolicyTable) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(self.dry_run);
        self.apply_policy(policy, &mut report).await?;
        Ok(report)
    }

    /// Check the firewall and the monitoring network before touching anything.
    /// Returns the interfaces present on the host.
    pub async fn preflight(&self, report: &mut ReconcileReport) -> Result<BTreeSet<String>> {
        let status = self.store.status().await?;
        if !status.active {
            return Err(ReconcileError::FirewallInactive);
        }
        if !status.default_incoming_is_deny() {
            let policy = status.default_incoming.as_deref().unwrap_or("unknown");
            warn!(policy = %policy, "UFW default incoming policy is not deny");
            report.warn(format!("default incoming policy is '{}', expected deny", policy));
        }

        let name = &self.expected_network.name;
        let observed = self
            .engine
            .inspect_network(name)
            .await?
            .ok_or_else(|| ReconcileError::MonitoringNetworkMissing {
                network: name.clone(),
            })?;

        if let Some(mismatch) = network::compare(&self.expected_network, &observed)
            .into_iter()
            .next()
        {
            return Err(ReconcileError::MonitoringNetworkMismatch {
                network: name.clone(),
                field: mismatch.field,
                expected: mismatch.expected,
                actual: mismatch.actual,
            });
        }

        let live = self
            .interfaces
            .interfaces()
            .map_err(ReconcileError::Interfaces)?;
        if let Some(bridge) = &self.expected_network.bridge_name {
            if !live.contains(bridge) {
                return Err(ReconcileError::BridgeInterfaceMissing {
                    interface: bridge.clone(),
                });
            }
        }

        debug!(network = %name, interfaces = live.len(), "Preflight passed");
        Ok(live)
    }

    async fn apply_policy(&mut self, policy: &PolicyTable, report: &mut ReconcileReport) -> Result<()> {
        for phase in Phase::ORDER {
            debug!(phase = %phase, "Reconciling policy phase");
            for entry in policy.phase(phase) {
                match &entry.desired {
                    DesiredAction::EnsurePresent { rule, placement } => {
                        self.ensure_present(entry, rule, *placement, report).await?
                    }
                    DesiredAction::EnsureAbsent => self.ensure_absent(entry, report).await?,
                }
            }
        }
        Ok(())
    }

    /// Keep exactly one tagged rule matching the entry, inserting it if
    /// none survives
    async fn ensure_present(
        &mut self,
        entry: &PolicyEntry,
        rule: &RuleSpec,
        placement: Placement,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let mut max_passes = None;
        let mut passes = 0;

        loop {
            let snapshot = self.store.list_rules().await?;
            passes += 1;
            if passes > *max_passes.get_or_insert(snapshot.len() + 2) {
                return Err(ReconcileError::NoProgress {
                    tag: entry.tag.clone(),
                    passes,
                });
            }

            let matches = find_matching(&snapshot, &entry.pattern);
            let kept = matches
                .iter()
                .find(|r| r.has_tag(&entry.tag))
                .map(|r| r.index);

            let victim = matches
                .iter()
                .copied()
                .filter(|r| Some(r.index) != kept)
                .chain(
                    snapshot
                        .iter()
                        .filter(|r| r.has_tag(&entry.tag) && !entry.pattern.matches(r)),
                )
                .max_by_key(|r| r.index);

            if let Some(victim) = victim {
                self.delete_rule(victim, StaleReason::SupersededByTaggedRule, Some(entry.tag.as_str()), report)
                    .await?;
                continue;
            }

            match kept {
                Some(index) => {
                    debug!(tag = %entry.tag, index, "Rule already present");
                }
                None => self.insert_rule(rule, placement, report).await?,
            }
            return Ok(());
        }
    }

    /// Delete every rule the entry's pattern matches
    async fn ensure_absent(&mut self, entry: &PolicyEntry, report: &mut ReconcileReport) -> Result<()> {
        let mut max_passes = None;
        let mut passes = 0;

        loop {
            let snapshot = self.store.list_rules().await?;
            passes += 1;
            if passes > *max_passes.get_or_insert(snapshot.len() + 2) {
                return Err(ReconcileError::NoProgress {
                    tag: entry.tag.clone(),
                    passes,
                });
            }

            let Some(victim) = find_matching(&snapshot, &entry.pattern)
                .into_iter()
                .max_by_key(|r| r.index)
            else {
                return Ok(());
            };

            self.delete_rule(victim, StaleReason::MatchesDenyPattern, Some(entry.tag.as_str()), report)
                .await?;
        }
    }

    /// Drop rules bound to bridges that no longer exist
    async fn remove_stale_interface_rules(
        &mut self,
        live_interfaces: &BTreeSet<String>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let mut max_passes = None;
        let mut passes = 0;

        loop {
            let snapshot = self.store.list_rules().await?;
            passes += 1;
            if passes > *max_passes.get_or_insert(snapshot.len() + 2) {
                return Err(ReconcileError::NoProgress {
                    tag: StaleReason::InterfaceMissing.to_string(),
                    passes,
                });
            }

            let Some(victim) = snapshot
                .iter()
                .filter(|r| self.detector.is_rule_stale(r, live_interfaces).is_some())
                .max_by_key(|r| r.index)
            else {
                return Ok(());
            };

            self.delete_rule(victim, StaleReason::InterfaceMissing, None, report)
                .await?;
        }
    }

    async fn remove_stale_networks(&mut self, report: &mut ReconcileReport) -> Result<()> {
        let networks = self.engine.list_networks().await?;

        for net in &networks {
            let NetworkVerdict::Removable(reason) =
                self.detector.is_network_safe_to_remove(net, &self.owner)
            else {
                continue;
            };

            let candidate = StaleResourceCandidate {
                kind: ResourceKind::Network,
                name: net.name.clone(),
                reason,
            };

            if self.dry_run {
                info!(candidate = %candidate, "DRY-RUN: would remove network");
            } else {
                info!(candidate = %candidate, "Removing network");
                match self.engine.remove_network(&net.name).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(network = %net.name, "Network already gone when removing");
                        report.warn(format!("network {} was already gone", net.name));
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            report.mutations.push(Mutation::RemoveNetwork {
                network: net.name.clone(),
                reason,
            });
        }

        Ok(())
    }

    async fn delete_rule(
        &mut self,
        rule: &FirewallRule,
        reason: StaleReason,
        tag: Option<&str>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.ensure_backup(report).await;

        let candidate = StaleResourceCandidate {
            kind: ResourceKind::Rule,
            name: rule.to_string(),
            reason,
        };
        let policy = tag.unwrap_or("-");
        if self.dry_run {
            info!(index = rule.index, candidate = %candidate, policy = %policy, "DRY-RUN: would delete rule");
        } else {
            info!(index = rule.index, candidate = %candidate, policy = %policy, "Deleting rule");
        }

        match self.store.delete_by_index(rule.index).await? {
            DeleteOutcome::Deleted => report.mutations.push(Mutation::DeleteRule {
                rule: rule.to_string(),
                reason,
            }),
            DeleteOutcome::AlreadyGone => {
                warn!(index = rule.index, rule = %rule, "Rule already gone; re-reading rules");
                report.warn(format!("rule {} was already gone", rule));
            }
        }
        Ok(())
    }

    async fn insert_rule(
        &mut self,
        rule: &RuleSpec,
        placement: Placement,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.ensure_backup(report).await;

        if self.dry_run {
            info!(tag = %rule.tag, rule = %rule, placement = ?placement, "DRY-RUN: would insert rule");
        } else {
            info!(tag = %rule.tag, rule = %rule, placement = ?placement, "Inserting rule");
        }

        self.store.insert(rule, placement).await?;
        report.mutations.push(Mutation::InsertRule {
            tag: rule.tag.clone(),
            rule: rule.to_string(),
        });
        Ok(())
    }

    /// Back up the rule list once, right before the first change. A failed
    /// backup is only a warning.
    async fn ensure_backup(&mut self, report: &mut ReconcileReport) {
        if self.dry_run || self.backup_attempted {
            return;
        }
        self.backup_attempted = true;

        let Some(writer) = &self.backup else {
            return;
        };

        let listings = async {
            let numbered = self.store.raw_listing().await?;
            let verbose = self.store.raw_status().await?;
            Ok::<_, crate::ufw::error::UfwError>((numbered, verbose))
        }
        .await;

        let result = match listings {
            Ok((numbered, verbose)) => writer.write(&numbered, &verbose).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(reason) = result {
            warn!(dir = %writer.dir().display(), error = %reason, "Failed to write firewall backup");
            report.warn(format!("backup failed: {}", reason));
        }
    }
}
