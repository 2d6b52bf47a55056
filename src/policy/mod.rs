//! Declared firewall policy and the structural rule matcher.
//!
//! Every entry owns a tag. `EnsurePresent` entries carry the concrete rule
//! to insert; `EnsureAbsent` entries only describe what must go. The table
//! is validated up front so that no two entries can fight over the same
//! rule, which is what keeps a second reconcile run free of mutations.


use crate::config::ReconcileConfig;
use crate::ufw::rule::{Action, Direction, FirewallRule, Placement, Protocol, RuleSpec, Source};
use ipnet::{IpNet, Ipv6Net};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;

const GLOBAL_UNICAST_V6: Ipv6Net = Ipv6Net::new_assert(Ipv6Addr::new(0x2000, 0, 0, 0, 0, 0, 0, 0), 3);
const LINK_LOCAL_V6: Ipv6Net = Ipv6Net::new_assert(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10);

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy entry has an empty tag")]
    EmptyTag,

    #[error("Duplicate policy tag '{tag}'")]
    DuplicateTag { tag: String },

    #[error("Policy entry '{tag}' declares a rule its own pattern does not match")]
    SelfMismatch { tag: String },

    #[error("Policy entries '{first}' and '{second}' both ensure a rule matching the same pattern")]
    OverlappingEntries { first: String, second: String },

    #[error("Rule ensured by '{present}' would be removed by '{absent}'")]
    Conflict { present: String, absent: String },

    #[error("Monitoring network has no subnet; cannot scope the metrics rule")]
    MissingMonitoringSubnet,
}

/// Which sources a pattern accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatch {
    Any,
    Exact(Source),
    OneOf(Vec<Source>),
}

impl SourceMatch {
    pub fn matches(&self, source: &Source) -> bool {
        match self {
            SourceMatch::Any => true,
            SourceMatch::Exact(expected) => expected == source,
            SourceMatch::OneOf(options) => options.contains(source),
        }
    }

    fn intersects(&self, other: &SourceMatch) -> bool {
        match (self, other) {
            (SourceMatch::Any, _) | (_, SourceMatch::Any) => true,
            (SourceMatch::Exact(a), b) => b.matches(a),
            (a, SourceMatch::Exact(b)) => a.matches(b),
            (SourceMatch::OneOf(a), b) => a.iter().any(|s| b.matches(s)),
        }
    }
}

impl fmt::Display for SourceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMatch::Any => write!(f, "any source"),
            SourceMatch::Exact(source) => write!(f, "{}", source),
            SourceMatch::OneOf(sources) => {
                let list: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
                write!(f, "one of [{}]", list.join(", "))
            }
        }
    }
}

/// Structural description of the rules an entry is about
///
/// Tag and index never take part in matching. A pattern without a protocol
/// matches either protocol, and a rule without a protocol (ufw's "both")
/// matches a protocol-specific pattern. A pattern without an interface
/// ignores the rule's interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    pub port: u16,
    pub protocol: Option<Protocol>,
    pub action: Action,
    pub direction: Direction,
    pub source: SourceMatch,
    pub interface: Option<String>,
}

impl MatchPattern {
    pub fn new(port: u16, protocol: Option<Protocol>, action: Action, source: SourceMatch) -> Self {
        Self {
            port,
            protocol,
            action,
            direction: Direction::In,
            source,
            interface: None,
        }
    }

    pub fn on_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// The pattern that identifies `rule` exactly
    pub fn for_rule(rule: &RuleSpec) -> Self {
        Self {
            port: rule.port,
            protocol: rule.protocol,
            action: rule.action,
            direction: Direction::In,
            source: SourceMatch::Exact(rule.source),
            interface: rule.interface.clone(),
        }
    }

    pub fn matches(&self, rule: &FirewallRule) -> bool {
        if rule.port != Some(self.port) || rule.action != self.action || rule.direction != self.direction {
            return false;
        }

        if let (Some(wanted), Some(actual)) = (self.protocol, rule.protocol) {
            if wanted != actual {
                return false;
            }
        }

        if let Some(iface) = &self.interface {
            if rule.interface.as_deref() != Some(iface.as_str()) {
                return false;
            }
        }

        self.source.matches(&rule.source)
    }

    /// Whether some rule could match both patterns. A protocol-less rule
    /// matches every protocol, so protocols never separate two patterns.
    pub fn overlaps(&self, other: &MatchPattern) -> bool {
        let interfaces_compatible = match (&self.interface, &other.interface) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };

        self.port == other.port
            && self.action == other.action
            && self.direction == other.direction
            && interfaces_compatible
            && self.source.intersects(&other.source)
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Some(proto) => write!(f, "{}/{}", self.port, proto)?,
            None => write!(f, "{}", self.port)?,
        }
        if let Some(iface) = &self.interface {
            write!(f, " on {}", iface)?;
        }
        write!(f, " {} {} from {}", self.action, self.direction, self.source)
    }
}

/// Every rule in `rules` that structurally matches `pattern`, in list order
pub fn find_matching<'a>(rules: &'a [FirewallRule], pattern: &MatchPattern) -> Vec<&'a FirewallRule> {
    rules.iter().filter(|rule| pattern.matches(rule)).collect()
}

/// Reconciliation phase owning an entry; phases run in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Removal,
    Enforcement,
    SteadyState,
}

impl Phase {
    pub const ORDER: [Phase; 3] = [Phase::Removal, Phase::Enforcement, Phase::SteadyState];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Removal => write!(f, "removal"),
            Phase::Enforcement => write!(f, "enforcement"),
            Phase::SteadyState => write!(f, "steady-state"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredAction {
    EnsurePresent { rule: RuleSpec, placement: Placement },
    EnsureAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub tag: String,
    pub pattern: MatchPattern,
    pub desired: DesiredAction,
    pub phase: Phase,
    pub description: String,
}

impl PolicyEntry {
    /// Keep a rule present; the pattern is derived from the rule itself
    pub fn present(phase: Phase, rule: RuleSpec, placement: Placement, description: impl Into<String>) -> Self {
        Self {
            tag: rule.tag.clone(),
            pattern: MatchPattern::for_rule(&rule),
            desired: DesiredAction::EnsurePresent { rule, placement },
            phase,
            description: description.into(),
        }
    }

    pub fn absent(tag: impl Into<String>, pattern: MatchPattern, description: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            pattern,
            desired: DesiredAction::EnsureAbsent,
            phase: Phase::Removal,
            description: description.into(),
        }
    }

    pub fn rule(&self) -> Option<&RuleSpec> {
        match &self.desired {
            DesiredAction::EnsurePresent { rule, .. } => Some(rule),
            DesiredAction::EnsureAbsent => None,
        }
    }
}

/// A validated, ordered set of policy entries
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: Vec<PolicyEntry>,
}

impl PolicyTable {
    pub fn new(entries: Vec<PolicyEntry>) -> Result<Self, PolicyError> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.iter().filter(move |e| e.phase == phase)
    }

    pub fn get(&self, tag: &str) -> Option<&PolicyEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// The exposure contract for a monitoring host
    pub fn for_config(config: &ReconcileConfig) -> Result<Self, PolicyError> {
        let ports = &config.ports;
        let lan = Source::Net(config.lan_cidr);
        let admin = Source::Net(config.admin_net());
        let monitoring_subnet = config
            .monitoring_subnet()
            .ok_or(PolicyError::MissingMonitoringSubnet)?;

        let tcp = Some(Protocol::Tcp);
        let mut entries = Vec::new();

        // Removal: broad allows from earlier configurations
        for (name, port) in [("ssh", ports.ssh), ("grafana", ports.grafana), ("vlogs", ports.vlogs_ui)] {
            entries.push(PolicyEntry::absent(
                format!("legacy-{}-anywhere", name),
                MatchPattern::new(port, None, Action::Allow, SourceMatch::Exact(Source::Anywhere)),
                format!("{} must not be open to every IPv4 address", name),
            ));
        }

        let global_v6 = SourceMatch::OneOf(vec![
            Source::AnywhereV6,
            Source::Net(IpNet::V6(GLOBAL_UNICAST_V6)),
            Source::Net(IpNet::V6(LINK_LOCAL_V6)),
        ]);
        let mut seen_ports = HashSet::new();
        for port in ports.all() {
            if seen_ports.insert(port) {
                entries.push(PolicyEntry::absent(
                    format!("v6-global-{}", port),
                    MatchPattern::new(port, None, Action::Allow, global_v6.clone()),
                    format!("port {} must not be reachable over global IPv6", port),
                ));
            }
        }

        for (name, port) in [("prometheus", ports.prometheus), ("alertmanager", ports.alertmanager)] {
            entries.push(PolicyEntry::absent(
                format!("{}-exposure", name),
                MatchPattern::new(port, None, Action::Allow, SourceMatch::Any),
                format!("{} must not be exposed on the host", name),
            ));
        }

        // Enforcement: allows go on top so they win over the denies below
        let allow = |port: u16, source: Source, tag: &str| {
            RuleSpec::builder()
                .port(port)
                .maybe_protocol(tcp)
                .action(Action::Allow)
                .source(source)
                .tag(tag)
                .build()
        };
        let deny = |port: u16, source: Source, tag: &str| {
            RuleSpec::builder()
                .port(port)
                .maybe_protocol(tcp)
                .action(Action::Deny)
                .source(source)
                .tag(tag)
                .build()
        };

        let enforcement = [
            (allow(ports.ssh, admin, "ssh-admin"), Placement::Top, "SSH from the admin workstation"),
            (allow(ports.ssh, lan, "ssh-lan"), Placement::Top, "SSH from the LAN"),
            (allow(ports.grafana, lan, "grafana-lan"), Placement::Top, "Grafana from the LAN"),
            (allow(ports.vlogs_ui, lan, "vlogs-lan"), Placement::Top, "VictoriaLogs UI from the LAN"),
            (deny(ports.grafana, Source::Anywhere, "grafana-deny-v4"), Placement::Bottom, "Grafana closed to everyone else"),
            (deny(ports.grafana, Source::AnywhereV6, "grafana-deny-v6"), Placement::Bottom, "Grafana closed over IPv6"),
            (deny(ports.vlogs_ui, Source::Anywhere, "vlogs-deny-v4"), Placement::Bottom, "VictoriaLogs UI closed to everyone else"),
            (deny(ports.vlogs_ui, Source::AnywhereV6, "vlogs-deny-v6"), Placement::Bottom, "VictoriaLogs UI closed over IPv6"),
        ];
        for (rule, placement, description) in enforcement {
            entries.push(PolicyEntry::present(Phase::Enforcement, rule, placement, description));
        }

        let metrics = RuleSpec::builder()
            .port(ports.docker_metrics)
            .maybe_protocol(tcp)
            .action(Action::Allow)
            .source(Source::Net(monitoring_subnet))
            .interface(config.monitoring_bridge())
            .tag("docker-metrics-monitoring")
            .build();
        entries.push(PolicyEntry::present(
            Phase::SteadyState,
            metrics,
            Placement::Top,
            "Docker engine metrics from the monitoring network only",
        ));

        Self::new(entries)
    }
}

/// Reject tables that could never converge
pub fn validate(entries: &[PolicyEntry]) -> Result<(), PolicyError> {
    let mut tags = HashSet::new();
    for entry in entries {
        if entry.tag.trim().is_empty() {
            return Err(PolicyError::EmptyTag);
        }
        if !tags.insert(entry.tag.as_str()) {
            return Err(PolicyError::DuplicateTag {
                tag: entry.tag.clone(),
            });
        }
        if let Some(rule) = entry.rule() {
            if rule.tag != entry.tag || !entry.pattern.matches(&rule.to_rule(1)) {
                return Err(PolicyError::SelfMismatch {
                    tag: entry.tag.clone(),
                });
            }
        }
    }

    let present: Vec<&PolicyEntry> = entries.iter().filter(|e| e.rule().is_some()).collect();

    for (i, first) in present.iter().enumerate() {
        for second in &present[i + 1..] {
            if first.pattern.overlaps(&second.pattern) {
                return Err(PolicyError::OverlappingEntries {
                    first: first.tag.clone(),
                    second: second.tag.clone(),
                });
            }
        }
    }

    for keep in &present {
        let Some(rule) = keep.rule() else { continue };
        let materialized = rule.to_rule(1);
        for absent in entries.iter().filter(|e| e.rule().is_none()) {
            if absent.pattern.matches(&materialized) {
                return Err(PolicyError::Conflict {
                    present: keep.tag.clone(),
                    absent: absent.tag.clone(),
                });
            }
        }
    }

    Ok(())
}
