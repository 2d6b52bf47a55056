//! Parsing for the line-oriented output of `ufw status numbered` and
//! `ufw status verbose`.
//!
//! A numbered line looks like
//!
//! ```text
//! [ 1] 9323/tcp on br-monitoring       ALLOW IN    172.20.0.0/16              # iac:docker-metrics-monitoring
//! [ 7] 3000/tcp (v6)                   DENY IN     Anywhere (v6)
//! ```
//!
//! Header lines and anything not starting with `[` are skipped. A rule line
//! that cannot be understood is an error, never silently dropped.

use crate::ufw::error::UfwError;
use crate::ufw::rule::{Action, Direction, FirewallRule, Protocol, Source};
use ipnet::IpNet;
use std::net::IpAddr;

/// State reported by `ufw status verbose`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UfwStatus {
    pub active: bool,
    /// Default policy for incoming traffic, e.g. `deny`
    pub default_incoming: Option<String>,
}

impl UfwStatus {
    pub fn default_incoming_is_deny(&self) -> bool {
        matches!(self.default_incoming.as_deref(), Some("deny") | Some("reject"))
    }
}

pub fn parse_status(output: &str) -> UfwStatus {
    let mut status = UfwStatus::default();

    for line in output.lines().map(str::trim) {
        if let Some(state) = line.strip_prefix("Status:") {
            status.active = state.trim().eq_ignore_ascii_case("active");
        } else if let Some(defaults) = line.strip_prefix("Default:") {
            // Default: deny (incoming), allow (outgoing), disabled (routed)
            status.default_incoming = defaults.split(',').find_map(|part| {
                part.trim()
                    .strip_suffix("(incoming)")
                    .map(|policy| policy.trim().to_ascii_lowercase())
            });
        }
    }

    status
}

pub fn parse_numbered(output: &str) -> Result<Vec<FirewallRule>, UfwError> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with('['))
        .map(parse_line)
        .collect()
}

pub fn parse_line(line: &str) -> Result<FirewallRule, UfwError> {
    let trimmed = line.trim();

    let (index, rest) = trimmed
        .strip_prefix('[')
        .and_then(|s| s.split_once(']'))
        .ok_or_else(|| UfwError::parse(line, "missing rule number"))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| UfwError::parse(line, "rule number is not an integer"))?;

    let (body, comment) = match rest.split_once(" # ") {
        Some((body, comment)) => (body, Some(comment.trim().to_string())),
        None => (rest, None),
    };

    let tokens: Vec<&str> = body.split_whitespace().collect();
    let action_pos = tokens
        .iter()
        .position(|t| t.parse::<Action>().is_ok())
        .ok_or_else(|| UfwError::parse(line, "no ALLOW/DENY/REJECT/LIMIT column"))?;
    let action = tokens[action_pos]
        .parse::<Action>()
        .map_err(|reason| UfwError::parse(line, reason))?;

    let (direction, from_start) = match tokens.get(action_pos + 1).map(|t| t.parse::<Direction>()) {
        Some(Ok(direction)) => (direction, action_pos + 2),
        _ => (Direction::In, action_pos + 1),
    };

    let to = parse_to_column(line, &tokens[..action_pos])?;
    let (source, from_interface) = parse_from_column(line, &tokens[from_start..])?;

    let v6 = to.v6 || source.is_v6();

    Ok(FirewallRule {
        index,
        to: to.raw,
        port: to.port,
        protocol: to.protocol,
        v6,
        interface: to.interface.or(from_interface),
        action,
        direction,
        source,
        comment,
    })
}

struct ToColumn {
    raw: String,
    port: Option<u16>,
    protocol: Option<Protocol>,
    v6: bool,
    interface: Option<String>,
}

fn parse_to_column(line: &str, tokens: &[&str]) -> Result<ToColumn, UfwError> {
    if tokens.is_empty() {
        return Err(UfwError::parse(line, "empty To column"));
    }

    let mut v6 = false;
    let mut interface = None;
    let mut dest = Vec::new();

    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        match *token {
            "(v6)" => v6 = true,
            "on" => {
                interface = Some(
                    iter.next()
                        .ok_or_else(|| UfwError::parse(line, "'on' without interface"))?
                        .to_string(),
                )
            }
            t if t.starts_with('(') => {}
            t => dest.push(t),
        }
    }

    let (port, protocol) = dest
        .last()
        .map(|spec| parse_port_spec(spec))
        .unwrap_or((None, None));

    Ok(ToColumn {
        raw: tokens.join(" "),
        port,
        protocol,
        v6,
        interface,
    })
}

/// `22`, `9428/tcp` or `53/udp`. Ranges, lists and app names yield no
/// single port.
fn parse_port_spec(spec: &str) -> (Option<u16>, Option<Protocol>) {
    let (port, protocol) = match spec.split_once('/') {
        Some((port, proto)) => (port, proto.parse::<Protocol>().ok()),
        None => (spec, None),
    };
    (port.parse::<u16>().ok(), protocol)
}

fn parse_from_column(line: &str, tokens: &[&str]) -> Result<(Source, Option<String>), UfwError> {
    let mut source = None;
    let mut interface = None;

    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match *token {
            "Anywhere" if source.is_none() => {
                if iter.peek() == Some(&&"(v6)") {
                    iter.next();
                    source = Some(Source::AnywhereV6);
                } else {
                    source = Some(Source::Anywhere);
                }
            }
            "on" => {
                interface = Some(
                    iter.next()
                        .ok_or_else(|| UfwError::parse(line, "'on' without interface"))?
                        .to_string(),
                )
            }
            t if t.starts_with('(') => {}
            t if source.is_none() => source = Some(Source::Net(parse_address(line, t)?)),
            // Source port or app name after the address
            _ => {}
        }
    }

    let source = source.ok_or_else(|| UfwError::parse(line, "empty From column"))?;
    Ok((source, interface))
}

fn parse_address(line: &str, token: &str) -> Result<IpNet, UfwError> {
    if let Ok(net) = token.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    token
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| UfwError::parse(line, format!("'{}' is not an address", token)))
}

/// Render rules in the same layout as `ufw status numbered`
pub fn render_numbered(status: &UfwStatus, rules: &[FirewallRule]) -> String {
    let mut out = format!(
        "Status: {}\n\n",
        if status.active { "active" } else { "inactive" }
    );
    if rules.is_empty() {
        return out;
    }

    out.push_str("     To                         Action      From\n");
    out.push_str("     --                         ------      ----\n");
    for rule in rules {
        let action = format!("{} {}", rule.action, rule.direction);
        let mut line = format!(
            "[{:>2}] {:<26} {:<11} {}",
            rule.index,
            rule.to,
            action,
            rule.source
        );
        if let Some(comment) = &rule.comment {
            line = format!("{:<70} # {}", line, comment);
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Render a status block in the same layout as `ufw status verbose`
pub fn render_status(status: &UfwStatus) -> String {
    format!(
        "Status: {}\nDefault: {} (incoming)\n",
        if status.active { "active" } else { "inactive" },
        status.default_incoming.as_deref().unwrap_or("deny")
    )
}
