//! Decides which leftover networks and firewall rules are safe to remove.

use crate::docker::network::ObservedNetwork;
use crate::ufw::rule::FirewallRule;
use bon::Builder;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};
use wildmatch::WildMatch;

/// Why a resource was judged stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaleReason {
    InterfaceMissing,
    SupersededByTaggedRule,
    MatchesDenyPattern,
    UnusedAndForeign,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::InterfaceMissing => write!(f, "interface-missing"),
            StaleReason::SupersededByTaggedRule => write!(f, "superseded-by-tagged-rule"),
            StaleReason::MatchesDenyPattern => write!(f, "matches-deny-pattern"),
            StaleReason::UnusedAndForeign => write!(f, "unused-and-foreign"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Rule,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Rule => write!(f, "rule"),
        }
    }
}

/// A resource picked for removal during one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleResourceCandidate {
    pub kind: ResourceKind,
    /// Network name or the rule as printed by ufw
    pub name: String,
    pub reason: StaleReason,
}

impl fmt::Display for StaleResourceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.kind, self.name, self.reason)
    }
}

/// Named reason a network removal was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    HasAttachedContainers,
    Protected,
    OwnedByActiveDeployment,
    NotStalePattern,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::HasAttachedContainers => write!(f, "has attached containers"),
            Refusal::Protected => write!(f, "protected network"),
            Refusal::OwnedByActiveDeployment => write!(f, "owned by the active deployment"),
            Refusal::NotStalePattern => write!(f, "name matches no stale pattern"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkVerdict {
    Removable(StaleReason),
    Refused(Refusal),
}

#[derive(Debug, Clone, Builder)]
pub struct StaleResourceDetector {
    /// Interface name prefixes that this host creates and may clean up
    #[builder(default = vec!["br-".to_string()])]
    stale_interface_prefixes: Vec<String>,
    /// Bridges never treated as stale, even when absent
    #[builder(default)]
    protected_interfaces: Vec<String>,
    #[builder(default)]
    stale_network_patterns: Vec<String>,
    #[builder(into)]
    protected_network: String,
}

impl StaleResourceDetector {
    /// Guard clauses in order; the first refusal wins
    pub fn is_network_safe_to_remove(
        &self,
        network: &ObservedNetwork,
        current_owner: &str,
    ) -> NetworkVerdict {
        let verdict = self.judge_network(network, current_owner);
        match verdict {
            NetworkVerdict::Refused(refusal) => {
                info!(network = %network.name, reason = %refusal, "Keeping network");
            }
            NetworkVerdict::Removable(reason) => {
                debug!(network = %network.name, reason = %reason, "Network is removable");
            }
        }
        verdict
    }

    fn judge_network(&self, network: &ObservedNetwork, current_owner: &str) -> NetworkVerdict {
        if network.has_attached_containers {
            return NetworkVerdict::Refused(Refusal::HasAttachedContainers);
        }

        if network.name == self.protected_network {
            return NetworkVerdict::Refused(Refusal::Protected);
        }

        if network.owner_label.as_deref() == Some(current_owner) {
            return NetworkVerdict::Refused(Refusal::OwnedByActiveDeployment);
        }

        if !self
            .stale_network_patterns
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(&network.name))
        {
            return NetworkVerdict::Refused(Refusal::NotStalePattern);
        }

        NetworkVerdict::Removable(StaleReason::UnusedAndForeign)
    }

    /// Whether `rule` is bound to a bridge this host created that no longer
    /// exists
    pub fn is_rule_stale(
        &self,
        rule: &FirewallRule,
        live_interfaces: &BTreeSet<String>,
    ) -> Option<StaleReason> {
        let iface = rule.interface.as_deref().filter(|i| !i.is_empty())?;

        if live_interfaces.contains(iface) {
            return None;
        }

        if self.protected_interfaces.iter().any(|p| p == iface) {
            warn!(index = rule.index, interface = %iface, "Protected interface is missing; keeping its rule");
            return None;
        }

        if !self
            .stale_interface_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && iface.starts_with(prefix.as_str()))
        {
            warn!(
                index = rule.index,
                interface = %iface,
                "Rule references a missing interface outside the stale prefixes; leaving it"
            );
            return None;
        }

        Some(StaleReason::InterfaceMissing)
    }
}
