use crate::docker::error::DockerError;
use crate::docker::network::NetworkField;
use crate::ufw::error::UfwError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("UFW is not active; enable it before reconciling")]
    FirewallInactive,

    #[error("Monitoring network '{network}' does not exist; run `netwarden bootstrap` first")]
    MonitoringNetworkMissing { network: String },

    #[error("Monitoring network '{network}' has {field} '{actual}', expected '{expected}'")]
    MonitoringNetworkMismatch {
        network: String,
        field: NetworkField,
        expected: String,
        actual: String,
    },

    #[error("Bridge interface '{interface}' for the monitoring network is not present on the host")]
    BridgeInterfaceMissing { interface: String },

    #[error("Failed to list host network interfaces")]
    Interfaces(#[source] std::io::Error),

    #[error("Policy entry '{tag}' did not converge after {passes} passes")]
    NoProgress { tag: String, passes: usize },

    #[error(transparent)]
    Ufw(#[from] UfwError),

    #[error(transparent)]
    Docker(#[from] DockerError),
}

impl ReconcileError {
    /// Host state that must be fixed before any rule is touched
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::FirewallInactive
            | Self::MonitoringNetworkMissing { .. }
            | Self::MonitoringNetworkMismatch { .. }
            | Self::BridgeInterfaceMissing { .. } => true,
            Self::Ufw(e) => e.is_precondition(),
            Self::Interfaces(_) | Self::NoProgress { .. } | Self::Docker(_) => false,
        }
    }
}
