use crate::docker::error::DockerError;
use crate::docker::network::NetworkField;
use ipnet::IpNet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid network spec: {reason}")]
    InvalidSpec { reason: String },

    #[error("Network '{network}' exists with {field} '{actual}', expected '{expected}'")]
    NetworkMismatch {
        network: String,
        field: NetworkField,
        expected: String,
        actual: String,
    },

    #[error("Network '{network}' does not exist and CREATE_IF_MISSING is disabled")]
    NetworkMissing { network: String },

    #[error(
        "Subnet {requested} for network '{network}' overlaps {existing} of existing network '{existing_network}'"
    )]
    SubnetOverlap {
        network: String,
        requested: IpNet,
        existing_network: String,
        existing: IpNet,
    },

    #[error("Docker engine unavailable during {operation}")]
    EngineUnavailable {
        operation: String,
        #[source]
        source: DockerError,
    },

    #[error("Network '{network}' was created but is not visible on re-inspect")]
    CreationNotVisible { network: String },

    #[error(transparent)]
    Engine(#[from] DockerError),
}

impl BootstrapError {
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    /// Wrap an engine error, separating "daemon unreachable" from a refused
    /// request
    pub fn engine(operation: impl Into<String>, source: DockerError) -> Self {
        if source.is_unavailable() {
            Self::EngineUnavailable {
                operation: operation.into(),
                source,
            }
        } else {
            Self::Engine(source)
        }
    }
}
