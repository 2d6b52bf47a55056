use bon::Builder;
use ipnet::IpNet;
use std::fmt;
use std::str::FromStr;

/// Comment prefix marking rules owned by this tool: `comment iac:<tag>`
pub const TAG_PREFIX: &str = "iac:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unsupported protocol '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Allow,
    Deny,
    Reject,
    Limit,
}

impl Action {
    /// Lower-case verb used on the ufw command line
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
            Action::Reject => "reject",
            Action::Limit => "limit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb().to_ascii_uppercase())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Action::Allow),
            "DENY" => Ok(Action::Deny),
            "REJECT" => Ok(Action::Reject),
            "LIMIT" => Ok(Action::Limit),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    In,
    Out,
    Fwd,
}

impl Direction {
    pub fn verb(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Fwd => "fwd",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb().to_ascii_uppercase())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            "FWD" => Ok(Direction::Fwd),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// The `From` column of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// `Anywhere`, every IPv4 address
    Anywhere,
    /// `Anywhere (v6)`, every IPv6 address
    AnywhereV6,
    Net(IpNet),
}

impl Source {
    pub fn is_v6(&self) -> bool {
        match self {
            Source::Anywhere => false,
            Source::AnywhereV6 => true,
            Source::Net(net) => matches!(net, IpNet::V6(_)),
        }
    }

    /// Address form accepted by `ufw ... from <ADDR>`. The unspecified
    /// networks are spelled out so ufw adds a single-family rule.
    pub fn ufw_arg(&self) -> String {
        match self {
            Source::Anywhere => "0.0.0.0/0".to_string(),
            Source::AnywhereV6 => "::/0".to_string(),
            Source::Net(net) => display_net(net),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Anywhere => write!(f, "Anywhere"),
            Source::AnywhereV6 => write!(f, "Anywhere (v6)"),
            Source::Net(net) => write!(f, "{}", display_net(net)),
        }
    }
}

/// ufw prints host routes as bare addresses
fn display_net(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

/// One normalized line of `ufw status numbered`
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct FirewallRule {
    /// 1-based position in the snapshot this rule was read from
    pub index: usize,
    #[builder(into)]
    pub to: String,
    pub port: Option<u16>,
    /// `None` covers both tcp and udp
    pub protocol: Option<Protocol>,
    #[builder(default)]
    pub v6: bool,
    #[builder(into)]
    pub interface: Option<String>,
    pub action: Action,
    #[builder(default)]
    pub direction: Direction,
    pub source: Source,
    #[builder(into)]
    pub comment: Option<String>,
}

impl FirewallRule {
    /// Tag id carried in an `iac:<tag>` comment
    pub fn tag(&self) -> Option<&str> {
        self.comment
            .as_deref()
            .and_then(|c| c.trim().strip_prefix(TAG_PREFIX))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag() == Some(tag)
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {}",
            self.index, self.to, self.action, self.direction, self.source
        )?;
        if let Some(comment) = &self.comment {
            write!(f, " # {}", comment)?;
        }
        Ok(())
    }
}

/// Where a new rule lands in the ordered rule list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Ahead of every other rule of the same family
    Top,
    /// After every other rule of the same family
    Bottom,
}

/// A concrete rule to add, always tagged
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct RuleSpec {
    pub port: u16,
    pub protocol: Option<Protocol>,
    pub action: Action,
    pub source: Source,
    #[builder(into)]
    pub interface: Option<String>,
    #[builder(into)]
    pub tag: String,
}

impl RuleSpec {
    pub fn v6(&self) -> bool {
        self.source.is_v6()
    }

    pub fn comment(&self) -> String {
        format!("{}{}", TAG_PREFIX, self.tag)
    }

    /// Text of the `To` column ufw prints for this rule
    pub fn to_column(&self) -> String {
        let mut to = match self.protocol {
            Some(proto) => format!("{}/{}", self.port, proto),
            None => self.port.to_string(),
        };
        if self.v6() {
            to.push_str(" (v6)");
        }
        if let Some(iface) = &self.interface {
            to.push_str(" on ");
            to.push_str(iface);
        }
        to
    }

    /// The rule as it shows up in a listing at `index`
    pub fn to_rule(&self, index: usize) -> FirewallRule {
        FirewallRule {
            index,
            to: self.to_column(),
            port: Some(self.port),
            protocol: self.protocol,
            v6: self.v6(),
            interface: self.interface.clone(),
            action: self.action,
            direction: Direction::In,
            source: self.source,
            comment: Some(self.comment()),
        }
    }

    /// Arguments for the `ufw` binary.
    ///
    /// `insert 1` only works when the IPv4 list is non-empty and never for
    /// IPv6 rules, so top placement falls back to a plain add for an empty
    /// IPv4 list and uses `prepend` for IPv6.
    pub fn to_ufw_args(&self, placement: Placement, has_v4_rules: bool) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if placement == Placement::Top {
            if self.v6() {
                args.push("prepend".into());
            } else if has_v4_rules {
                args.extend(["insert".into(), "1".into()]);
            }
        }

        args.push(self.action.verb().into());
        args.push(Direction::In.verb().into());
        if let Some(iface) = &self.interface {
            args.extend(["on".into(), iface.clone()]);
        }
        if let Some(proto) = self.protocol {
            args.extend(["proto".into(), proto.to_string()]);
        }
        args.extend([
            "from".into(),
            self.source.ufw_arg(),
            "to".into(),
            "any".into(),
            "port".into(),
            self.port.to_string(),
            "comment".into(),
            self.comment(),
        ]);
        args
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {} # {}",
            self.to_column(),
            self.action,
            self.source,
            self.comment()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_rule() -> RuleSpec {
        RuleSpec::builder()
            .port(9323)
            .protocol(Protocol::Tcp)
            .action(Action::Allow)
            .source(Source::Net("172.20.0.0/16".parse().unwrap()))
            .interface("br-monitoring")
            .tag("docker-metrics-monitoring")
            .build()
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::Anywhere.to_string(), "Anywhere");
        assert_eq!(Source::AnywhereV6.to_string(), "Anywhere (v6)");
        assert_eq!(
            Source::Net("192.168.1.10/32".parse().unwrap()).to_string(),
            "192.168.1.10"
        );
        assert_eq!(
            Source::Net("2000::/3".parse().unwrap()).to_string(),
            "2000::/3"
        );
        assert!(Source::AnywhereV6.is_v6());
        assert!(!Source::Anywhere.is_v6());
    }

    #[test]
    fn test_tag_extraction() {
        let mut rule = metrics_rule().to_rule(1);
        assert_eq!(rule.tag(), Some("docker-metrics-monitoring"));

        rule.comment = Some("allow grafana".to_string());
        assert_eq!(rule.tag(), None);

        rule.comment = Some("iac:".to_string());
        assert_eq!(rule.tag(), None);
    }

    #[test]
    fn test_to_column_matches_ufw_layout() {
        assert_eq!(metrics_rule().to_column(), "9323/tcp on br-monitoring");

        let deny_v6 = RuleSpec::builder()
            .port(3000)
            .protocol(Protocol::Tcp)
            .action(Action::Deny)
            .source(Source::AnywhereV6)
            .tag("grafana-deny-v6")
            .build();
        assert_eq!(deny_v6.to_column(), "3000/tcp (v6)");
    }

    #[test]
    fn test_ufw_args_top_placement() {
        let args = metrics_rule().to_ufw_args(Placement::Top, true);
        assert_eq!(
            args,
            vec![
                "insert",
                "1",
                "allow",
                "in",
                "on",
                "br-monitoring",
                "proto",
                "tcp",
                "from",
                "172.20.0.0/16",
                "to",
                "any",
                "port",
                "9323",
                "comment",
                "iac:docker-metrics-monitoring",
            ]
        );

        let args = metrics_rule().to_ufw_args(Placement::Top, false);
        assert_eq!(args[0], "allow");
    }

    #[test]
    fn test_ufw_args_v6_and_bottom() {
        let deny_v6 = RuleSpec::builder()
            .port(9428)
            .protocol(Protocol::Tcp)
            .action(Action::Deny)
            .source(Source::AnywhereV6)
            .tag("vlogs-deny-v6")
            .build();

        let top = deny_v6.to_ufw_args(Placement::Top, true);
        assert_eq!(top[0], "prepend");

        let bottom = deny_v6.to_ufw_args(Placement::Bottom, true);
        assert_eq!(bottom[0], "deny");
        assert!(bottom.windows(2).any(|w| w[0] == "from" && w[1] == "::/0"));
    }
}
