use netwarden::config::ReconcileConfig;
use netwarden::policy::PolicyTable;
use netwarden::ufw::rule::{Action, FirewallRule, Source};

fn is_global_v6(source: &Source) -> bool {
    match source {
        Source::AnywhereV6 => true,
        Source::Net(net) => ["2000::/3", "fe80::/10"]
            .iter()
            .any(|global| global.parse::<ipnet::IpNet>().ok() == Some(*net)),
        _ => false,
    }
}

/// IPv4 rules first, indices 1..=n
pub fn assert_well_formed(rules: &[FirewallRule]) {
    for (i, rule) in rules.iter().enumerate() {
        assert_eq!(rule.index, i + 1, "index gap at {}", rule);
    }
    if let Some(first_v6) = rules.iter().position(|r| r.v6) {
        assert!(
            rules[first_v6..].iter().all(|r| r.v6),
            "IPv4 rule after the first IPv6 rule"
        );
    }
}

/// The ports the policy manages are reachable exactly as declared
pub fn assert_exposure_contract(rules: &[FirewallRule], config: &ReconcileConfig) {
    let ports = &config.ports;

    for port in [ports.ssh, ports.grafana, ports.vlogs_ui] {
        assert!(
            !rules.iter().any(|r| r.port == Some(port)
                && r.action == Action::Allow
                && r.source == Source::Anywhere),
            "port {} is open to every IPv4 address",
            port
        );
    }

    for port in ports.all() {
        assert!(
            !rules
                .iter()
                .any(|r| r.port == Some(port) && r.action == Action::Allow && is_global_v6(&r.source)),
            "port {} is reachable over global IPv6",
            port
        );
    }

    for port in [ports.prometheus, ports.alertmanager] {
        assert!(
            !rules
                .iter()
                .any(|r| r.port == Some(port) && r.action == Action::Allow),
            "port {} is exposed",
            port
        );
    }

    for port in [ports.grafana, ports.vlogs_ui] {
        let allow = rules
            .iter()
            .find(|r| r.port == Some(port) && r.action == Action::Allow && !r.v6)
            .map(|r| r.index);
        let deny = rules
            .iter()
            .find(|r| r.port == Some(port) && r.action == Action::Deny && !r.v6)
            .map(|r| r.index);
        match (allow, deny) {
            (Some(allow), Some(deny)) => assert!(allow < deny, "deny shadows allow on port {}", port),
            other => panic!("port {} is missing its allow/deny pair: {:?}", port, other),
        }
    }
}

/// Exactly one rule carries each ensured tag, and it matches its entry
pub fn assert_tags_converged(rules: &[FirewallRule], policy: &PolicyTable) {
    for entry in policy.entries().iter().filter(|e| e.rule().is_some()) {
        let tagged: Vec<_> = rules.iter().filter(|r| r.has_tag(&entry.tag)).collect();
        assert_eq!(tagged.len(), 1, "tag {} appears {} times", entry.tag, tagged.len());
        assert!(
            entry.pattern.matches(tagged[0]),
            "rule {} does not satisfy {}",
            tagged[0],
            entry.pattern
        );
    }
}
