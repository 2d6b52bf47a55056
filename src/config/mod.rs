pub mod error;

#[cfg(test)]
mod tests;

use crate::config::error::ConfigError;
use crate::docker::DEFAULT_OWNER_LABEL_KEY;
use crate::docker::network::NetworkSpec;
use bon::Builder;
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_NETWORKS: &str = "monitoring,apps";
pub const DEFAULT_MONITORING_NETWORK: &str = "monitoring";
pub const DEFAULT_MONITORING_BRIDGE: &str = "br-monitoring";
pub const DEFAULT_MONITORING_SUBNET: &str = "172.20.0.0/16";
pub const DEFAULT_MONITORING_GATEWAY: &str = "172.20.0.1";
pub const DEFAULT_PROJECT_OWNER: &str = "monitoring";
pub const DEFAULT_BACKUP_DIR: &str = "/var/backups/netwarden";
pub const DEFAULT_LOCK_FILE: &str = "/run/netwarden.lock";
pub const DEFAULT_STALE_INTERFACE_PREFIXES: &str = "br-";
pub const DEFAULT_STALE_NETWORK_PATTERNS: &str = "*_default";

/// Where configuration values come from
///
/// The process environment in production; a plain map in tests so nothing
/// has to mutate global state.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads from the process environment. Empty values count as unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

/// Load a dotenv file into the process environment. A missing default
/// `.env` is fine; a missing explicitly requested file is not.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map_err(|e| ConfigError::env_file(path, e.to_string())),
        None => match dotenvy::dotenv() {
            Ok(loaded) => {
                debug!(path = %loaded.display(), "Loaded environment file");
                Ok(())
            }
            Err(e) if e.not_found() => Ok(()),
            Err(e) => Err(ConfigError::env_file(".env", e.to_string())),
        },
    }
}

pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            name,
            value,
            "expected one of 1/0, true/false, yes/no, on/off",
        )),
    }
}

/// Comma separated list with blanks dropped
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_port(name: &str, value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(0) => Err(ConfigError::invalid(name, value, "port must be 1-65535")),
        Ok(port) => Ok(port),
        Err(e) => Err(ConfigError::invalid(name, value, e.to_string())),
    }
}

/// CIDR, or a bare address taken as a host route. Host bits are cleared so
/// the value compares equal to what `ufw status` prints.
pub fn parse_net(name: &str, value: &str) -> Result<IpNet> {
    let value = value.trim();
    if let Ok(net) = value.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    value
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| ConfigError::invalid(name, value, "expected a CIDR block or IP address"))
}

/// Like `parse_net`, but a /0 is refused: ufw prints it as `Anywhere`, so a
/// rule scoped to it could never be told apart from a public exposure.
pub fn parse_scoped_net(name: &str, value: &str) -> Result<IpNet> {
    let net = parse_net(name, value)?;
    if net.prefix_len() == 0 {
        return Err(ConfigError::invalid(
            name,
            value,
            "prefix length 0 matches every address; give the actual network",
        ));
    }
    Ok(net)
}

fn bool_var(env: &impl EnvSource, name: &str, default: bool) -> Result<bool> {
    env.get(name)
        .map(|value| parse_bool(name, &value))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

fn port_var(env: &impl EnvSource, name: &str, default: u16) -> Result<u16> {
    env.get(name)
        .map(|value| parse_port(name, &value))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

fn string_var(env: &impl EnvSource, name: &str, default: &str) -> String {
    env.get(name)
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| default.to_string())
}

fn duration_var(env: &impl EnvSource, name: &str, default: Duration) -> Result<Duration> {
    match env.get(name) {
        Some(value) => {
            crate::parse_duration(&value).map_err(|reason| ConfigError::invalid(name, value, reason))
        }
        None => Ok(default),
    }
}

fn path_var(env: &impl EnvSource, name: &str, default: &str) -> PathBuf {
    PathBuf::from(string_var(env, name, default))
}

/// Prefix used for per-network variables: `apps-v2` becomes `APPS_V2`
pub fn network_var_prefix(network: &str) -> String {
    network.to_ascii_uppercase().replace('-', "_")
}

/// Owner label key and value stamped on networks this host manages
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct OwnerLabel {
    #[builder(into, default = DEFAULT_OWNER_LABEL_KEY.to_string())]
    pub key: String,
    #[builder(into, default = DEFAULT_PROJECT_OWNER.to_string())]
    pub value: String,
}

impl OwnerLabel {
    fn from_env(env: &impl EnvSource) -> Self {
        Self {
            key: string_var(env, "OWNER_LABEL_KEY", DEFAULT_OWNER_LABEL_KEY),
            value: string_var(env, "PROJECT_OWNER", DEFAULT_PROJECT_OWNER),
        }
    }
}

/// Settings for `netwarden bootstrap`
#[derive(Debug, Clone, Builder)]
pub struct BootstrapConfig {
    pub networks: Vec<NetworkSpec>,
    #[builder(default = true)]
    pub create_if_missing: bool,
    #[builder(default)]
    pub dry_run: bool,
    #[builder(default = OwnerLabel::builder().build())]
    pub owner: OwnerLabel,
    #[builder(default = Duration::from_secs(10))]
    pub docker_timeout: Duration,
    #[builder(into, default = PathBuf::from(DEFAULT_LOCK_FILE))]
    pub lock_file: PathBuf,
}

impl BootstrapConfig {
    pub fn from_env(env: &impl EnvSource) -> Result<Self> {
        let names = parse_list(&string_var(env, "NETWORKS", DEFAULT_NETWORKS));
        if names.is_empty() {
            return Err(ConfigError::invalid(
                "NETWORKS",
                "",
                "at least one network name is required",
            ));
        }

        let networks = names
            .iter()
            .map(|name| network_spec_from_env(env, name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            networks,
            create_if_missing: bool_var(env, "CREATE_IF_MISSING", true)?,
            dry_run: bool_var(env, "DRY_RUN", false)?,
            owner: OwnerLabel::from_env(env),
            docker_timeout: duration_var(env, "DOCKER_TIMEOUT", Duration::from_secs(10))?,
            lock_file: path_var(env, "LOCK_FILE", DEFAULT_LOCK_FILE),
        })
    }
}

/// Read `<NAME>_SUBNET`, `<NAME>_GATEWAY` and `<NAME>_BRIDGE_NAME` for one
/// network. The monitoring network falls back to its well-known addressing.
fn network_spec_from_env(env: &impl EnvSource, name: &str) -> Result<NetworkSpec> {
    let prefix = network_var_prefix(name);
    let is_monitoring = name == DEFAULT_MONITORING_NETWORK;

    let lookup = |suffix: &str, monitoring_default: &str| -> Option<(String, String)> {
        let var = format!("{}_{}", prefix, suffix);
        env.get(&var)
            .or_else(|| is_monitoring.then(|| monitoring_default.to_string()))
            .map(|value| (var, value.trim().to_string()))
    };

    let subnet = lookup("SUBNET", DEFAULT_MONITORING_SUBNET)
        .map(|(var, value)| parse_net(&var, &value))
        .transpose()?;

    let gateway = lookup("GATEWAY", DEFAULT_MONITORING_GATEWAY)
        .map(|(var, value)| {
            value
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::invalid(&var, &value, "expected an IP address"))
                .map(|gw| (var, value, gw))
        })
        .transpose()?;

    let bridge_name = lookup("BRIDGE_NAME", DEFAULT_MONITORING_BRIDGE).map(|(_, value)| value);

    if let (Some(subnet), Some((var, value, gw))) = (&subnet, &gateway) {
        if !subnet.contains(gw) {
            return Err(ConfigError::invalid(
                var,
                value,
                format!("gateway is outside subnet {}", subnet),
            ));
        }
    }

    Ok(NetworkSpec {
        name: name.to_string(),
        bridge_name,
        subnet,
        gateway: gateway.map(|(_, _, gw)| gw),
    })
}

/// Service ports the firewall policy is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct ManagedPorts {
    #[builder(default = 22)]
    pub ssh: u16,
    #[builder(default = 3000)]
    pub grafana: u16,
    #[builder(default = 9428)]
    pub vlogs_ui: u16,
    #[builder(default = 9090)]
    pub prometheus: u16,
    #[builder(default = 9093)]
    pub alertmanager: u16,
    #[builder(default = 9323)]
    pub docker_metrics: u16,
}

impl Default for ManagedPorts {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ManagedPorts {
    fn from_env(env: &impl EnvSource) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            ssh: port_var(env, "SSH_PORT", defaults.ssh)?,
            grafana: port_var(env, "GRAFANA_PORT", defaults.grafana)?,
            vlogs_ui: port_var(env, "VLOGS_UI_PORT", defaults.vlogs_ui)?,
            prometheus: port_var(env, "PROMETHEUS_PORT", defaults.prometheus)?,
            alertmanager: port_var(env, "ALERTMANAGER_PORT", defaults.alertmanager)?,
            docker_metrics: port_var(env, "DOCKER_METRICS_PORT", defaults.docker_metrics)?,
        })
    }

    /// Every managed port, in policy order
    pub fn all(&self) -> [u16; 6] {
        [
            self.ssh,
            self.grafana,
            self.vlogs_ui,
            self.prometheus,
            self.alertmanager,
            self.docker_metrics,
        ]
    }
}

/// Settings for `netwarden reconcile`
#[derive(Debug, Clone, Builder)]
pub struct ReconcileConfig {
    pub lan_cidr: IpNet,
    pub admin_ipv4: Ipv4Addr,
    #[builder(default)]
    pub ports: ManagedPorts,
    pub monitoring: NetworkSpec,
    #[builder(default = vec![DEFAULT_STALE_INTERFACE_PREFIXES.to_string()])]
    pub stale_interface_prefixes: Vec<String>,
    #[builder(default = vec![DEFAULT_STALE_NETWORK_PATTERNS.to_string()])]
    pub stale_network_patterns: Vec<String>,
    #[builder(into)]
    pub protected_network: String,
    #[builder(default = OwnerLabel::builder().build())]
    pub owner: OwnerLabel,
    #[builder(into, default = PathBuf::from(DEFAULT_BACKUP_DIR))]
    pub backup_dir: PathBuf,
    #[builder(into, default = PathBuf::from(DEFAULT_LOCK_FILE))]
    pub lock_file: PathBuf,
    #[builder(default = Duration::from_secs(10))]
    pub docker_timeout: Duration,
}

impl ReconcileConfig {
    pub fn from_env(env: &impl EnvSource) -> Result<Self> {
        let lan_cidr = match env.get("LAN_CIDR") {
            Some(value) => parse_scoped_net("LAN_CIDR", &value)?,
            None => {
                return Err(ConfigError::missing(
                    "LAN_CIDR",
                    "set it to the home network, e.g. LAN_CIDR=192.168.1.0/24",
                ));
            }
        };

        let admin_ipv4 = match env.get("ADMIN_IPV4") {
            Some(value) => value.trim().parse::<Ipv4Addr>().map_err(|_| {
                ConfigError::invalid("ADMIN_IPV4", &value, "expected an IPv4 address")
            })?,
            None => {
                return Err(ConfigError::missing(
                    "ADMIN_IPV4",
                    "set it to the workstation allowed to reach SSH",
                ));
            }
        };

        let monitoring_name = string_var(env, "MONITORING_NETWORK", DEFAULT_MONITORING_NETWORK);
        let monitoring = NetworkSpec {
            bridge_name: Some(string_var(
                env,
                "MONITORING_BRIDGE_NAME",
                DEFAULT_MONITORING_BRIDGE,
            )),
            subnet: Some(parse_scoped_net(
                "MONITORING_SUBNET",
                &string_var(env, "MONITORING_SUBNET", DEFAULT_MONITORING_SUBNET),
            )?),
            gateway: None,
            name: monitoring_name.clone(),
        };

        Ok(Self {
            lan_cidr,
            admin_ipv4,
            ports: ManagedPorts::from_env(env)?,
            monitoring,
            stale_interface_prefixes: parse_list(&string_var(
                env,
                "STALE_INTERFACE_PREFIXES",
                DEFAULT_STALE_INTERFACE_PREFIXES,
            )),
            stale_network_patterns: parse_list(&string_var(
                env,
                "STALE_NETWORK_PATTERNS",
                DEFAULT_STALE_NETWORK_PATTERNS,
            )),
            protected_network: string_var(env, "PROTECTED_NETWORK", &monitoring_name),
            owner: OwnerLabel::from_env(env),
            backup_dir: path_var(env, "BACKUP_DIR", DEFAULT_BACKUP_DIR),
            lock_file: path_var(env, "LOCK_FILE", DEFAULT_LOCK_FILE),
            docker_timeout: duration_var(env, "DOCKER_TIMEOUT", Duration::from_secs(10))?,
        })
    }

    /// Admin workstation as a host route
    pub fn admin_net(&self) -> IpNet {
        IpNet::V4(Ipv4Net::from(self.admin_ipv4))
    }

    /// Bridge interface the monitoring network must be bound to
    pub fn monitoring_bridge(&self) -> &str {
        self.monitoring
            .bridge_name
            .as_deref()
            .unwrap_or(DEFAULT_MONITORING_BRIDGE)
    }

    pub fn monitoring_subnet(&self) -> Option<IpNet> {
        self.monitoring.subnet
    }
}
