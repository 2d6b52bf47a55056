use crate::docker::error::DockerError;
use bollard::models::Network;
use bon::Builder;
use ipnet::IpNet;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

/// Driver option carrying the host-level bridge interface name
pub const BRIDGE_NAME_OPTION: &str = "com.docker.network.bridge.name";

/// Desired state for one Docker network
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct NetworkSpec {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub bridge_name: Option<String>,
    pub subnet: Option<IpNet>,
    pub gateway: Option<IpAddr>,
}

/// Live state of a Docker network as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct ObservedNetwork {
    #[builder(into, default)]
    pub id: String,
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub driver: Option<String>,
    #[builder(into)]
    pub bridge_name: Option<String>,
    #[builder(default)]
    pub subnets: Vec<IpNet>,
    pub gateway: Option<IpAddr>,
    #[builder(default)]
    pub has_attached_containers: bool,
    #[builder(into)]
    pub owner_label: Option<String>,
}

impl ObservedNetwork {
    /// Build an observed network from a Docker network inspect response
    pub fn from_inspect(network: &Network, owner_label_key: &str) -> Result<Self, DockerError> {
        let id = network
            .id
            .as_ref()
            .ok_or_else(|| DockerError::malformed_network("<unknown>", "network missing ID"))?
            .clone();

        let name = network
            .name
            .as_ref()
            .ok_or_else(|| DockerError::malformed_network(&id, "network missing name"))?
            .clone();

        let mut subnets = Vec::new();
        let mut gateway = None;

        if let Some(configs) = network.ipam.as_ref().and_then(|ipam| ipam.config.as_ref()) {
            for config in configs {
                if let Some(subnet_str) = &config.subnet {
                    match IpNet::from_str(subnet_str) {
                        Ok(net) => subnets.push(net),
                        Err(e) => warn!(
                            "Failed to parse subnet '{}' for network {}: {}",
                            subnet_str, name, e
                        ),
                    }
                }

                if gateway.is_none() {
                    if let Some(gateway_str) = &config.gateway {
                        match IpAddr::from_str(gateway_str) {
                            Ok(ip) => gateway = Some(ip),
                            Err(e) => warn!(
                                "Failed to parse gateway IP '{}' for network {}: {}",
                                gateway_str, name, e
                            ),
                        }
                    }
                }
            }
        }

        let bridge_name = network
            .options
            .as_ref()
            .and_then(|options| options.get(BRIDGE_NAME_OPTION))
            .filter(|bridge| !bridge.is_empty())
            .cloned();

        let has_attached_containers = network
            .containers
            .as_ref()
            .is_some_and(|containers| !containers.is_empty());

        let owner_label = network
            .labels
            .as_ref()
            .and_then(|labels| labels.get(owner_label_key))
            .cloned();

        debug!(
            network = %name,
            bridge = ?bridge_name,
            subnets = ?subnets,
            attached = has_attached_containers,
            "Observed network"
        );

        Ok(Self {
            id,
            name,
            driver: network.driver.clone(),
            bridge_name,
            subnets,
            gateway,
            has_attached_containers,
            owner_label,
        })
    }
}

/// Addressing field of a network that can disagree with its spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkField {
    BridgeName,
    Subnet,
    Gateway,
}

impl fmt::Display for NetworkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkField::BridgeName => write!(f, "bridge name"),
            NetworkField::Subnet => write!(f, "subnet"),
            NetworkField::Gateway => write!(f, "gateway"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: NetworkField,
    pub expected: String,
    pub actual: String,
}

/// Compare a live network against its spec. Only fields set in the spec are
/// checked; an empty result means the network satisfies the spec.
pub fn compare(spec: &NetworkSpec, observed: &ObservedNetwork) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    if let Some(expected) = &spec.bridge_name {
        if observed.bridge_name.as_deref() != Some(expected.as_str()) {
            mismatches.push(FieldMismatch {
                field: NetworkField::BridgeName,
                expected: expected.clone(),
                actual: observed
                    .bridge_name
                    .clone()
                    .unwrap_or_else(|| "<none>".to_string()),
            });
        }
    }

    if let Some(expected) = &spec.subnet {
        if !observed.subnets.contains(expected) {
            mismatches.push(FieldMismatch {
                field: NetworkField::Subnet,
                expected: expected.to_string(),
                actual: display_list(&observed.subnets),
            });
        }
    }

    if let Some(expected) = &spec.gateway {
        if observed.gateway.as_ref() != Some(expected) {
            mismatches.push(FieldMismatch {
                field: NetworkField::Gateway,
                expected: expected.to_string(),
                actual: observed
                    .gateway
                    .map(|gw| gw.to_string())
                    .unwrap_or_else(|| "<none>".to_string()),
            });
        }
    }

    mismatches
}

/// Whether two CIDR blocks share at least one address
pub fn nets_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Labels written on networks this tool creates
pub fn owner_labels(key: &str, owner: &str) -> HashMap<String, String> {
    HashMap::from([(key.to_string(), owner.to_string())])
}

fn display_list(nets: &[IpNet]) -> String {
    if nets.is_empty() {
        "<none>".to_string()
    } else {
        nets.iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{Ipam, IpamConfig, NetworkContainer};

    fn inspect_response(name: &str) -> Network {
        let mut network = Network::default();
        network.id = Some(format!("{}-id", name));
        network.name = Some(name.to_string());
        network.driver = Some("bridge".to_string());

        let mut ipam = Ipam::default();
        let mut config = IpamConfig::default();
        config.gateway = Some("172.20.0.1".to_string());
        config.subnet = Some("172.20.0.0/16".to_string());
        ipam.config = Some(vec![config]);
        network.ipam = Some(ipam);

        network.options = Some(HashMap::from([(
            BRIDGE_NAME_OPTION.to_string(),
            "br-monitoring".to_string(),
        )]));
        network.labels = Some(HashMap::from([(
            "com.docker.compose.project".to_string(),
            "monitoring".to_string(),
        )]));
        network
    }

    #[test]
    fn test_from_inspect_extracts_addressing() {
        let observed =
            ObservedNetwork::from_inspect(&inspect_response("monitoring"), "com.docker.compose.project")
                .unwrap();

        assert_eq!(observed.name, "monitoring");
        assert_eq!(observed.bridge_name.as_deref(), Some("br-monitoring"));
        assert_eq!(observed.subnets, vec!["172.20.0.0/16".parse::<IpNet>().unwrap()]);
        assert_eq!(observed.gateway, Some("172.20.0.1".parse().unwrap()));
        assert_eq!(observed.owner_label.as_deref(), Some("monitoring"));
        assert!(!observed.has_attached_containers);
    }

    #[test]
    fn test_from_inspect_detects_attached_containers() {
        let mut network = inspect_response("apps");
        network.containers = Some(HashMap::from([(
            "abc123".to_string(),
            NetworkContainer::default(),
        )]));

        let observed = ObservedNetwork::from_inspect(&network, "owner").unwrap();
        assert!(observed.has_attached_containers);
        assert_eq!(observed.owner_label, None);
    }

    #[test]
    fn test_from_inspect_missing_name() {
        let mut network = inspect_response("x");
        network.name = None;

        let result = ObservedNetwork::from_inspect(&network, "owner");
        assert!(result.unwrap_err().to_string().contains("missing name"));
    }

    #[test]
    fn test_from_inspect_skips_unparsable_subnet() {
        let mut network = inspect_response("x");
        network.ipam = Some(Ipam {
            config: Some(vec![IpamConfig {
                subnet: Some("not-a-cidr".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let observed = ObservedNetwork::from_inspect(&network, "owner").unwrap();
        assert!(observed.subnets.is_empty());
        assert_eq!(observed.gateway, None);
    }

    #[test]
    fn test_compare_only_checks_declared_fields() {
        let observed = ObservedNetwork::builder()
            .name("apps")
            .subnets(vec!["172.21.0.0/16".parse().unwrap()])
            .build();
        let spec = NetworkSpec::builder().name("apps").build();

        assert!(compare(&spec, &observed).is_empty());
    }

    #[test]
    fn test_compare_reports_bridge_mismatch() {
        let observed = ObservedNetwork::builder()
            .name("monitoring")
            .bridge_name("br-x")
            .build();
        let spec = NetworkSpec::builder()
            .name("monitoring")
            .bridge_name("br-monitoring")
            .build();

        let mismatches = compare(&spec, &observed);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, NetworkField::BridgeName);
        assert_eq!(mismatches[0].expected, "br-monitoring");
        assert_eq!(mismatches[0].actual, "br-x");
    }

    #[test]
    fn test_nets_overlap() {
        let wide: IpNet = "172.20.0.0/16".parse().unwrap();
        let inner: IpNet = "172.20.5.0/24".parse().unwrap();
        let other: IpNet = "172.21.0.0/16".parse().unwrap();
        let v6: IpNet = "fd00::/64".parse().unwrap();

        assert!(nets_overlap(&wide, &inner));
        assert!(nets_overlap(&inner, &wide));
        assert!(!nets_overlap(&wide, &other));
        assert!(!nets_overlap(&wide, &v6));
    }
}
