use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockerError {
    // Connection errors
    #[error("Failed to connect to Docker daemon at {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Docker daemon unreachable while trying to {operation}")]
    Unavailable {
        operation: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Docker operation timeout: {operation} exceeded {duration:?}")]
    OperationTimeout {
        operation: String,
        duration: Duration,
    },

    // Network errors
    #[error("Network '{network}' not found")]
    NetworkNotFound { network: String },

    #[error("Docker rejected {operation} for network '{network}' (HTTP {status_code}): {message}")]
    NetworkOperationFailed {
        network: String,
        operation: String,
        status_code: u16,
        message: String,
    },

    #[error("Malformed network '{network}' in Docker response: {reason}")]
    MalformedNetwork { network: String, reason: String },
}

impl DockerError {
    pub fn connection_failed(
        endpoint: impl Into<String>,
        reason: impl Into<String>,
        source: bollard::errors::Error,
    ) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
            source,
        }
    }

    pub fn operation_timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::OperationTimeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn network_not_found(network: impl Into<String>) -> Self {
        Self::NetworkNotFound {
            network: network.into(),
        }
    }

    pub fn malformed_network(network: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedNetwork {
            network: network.into(),
            reason: reason.into(),
        }
    }

    /// Classify a bollard error: HTTP responses from the daemon are operation
    /// failures, anything else means the daemon could not be reached.
    pub fn from_api(
        network: impl Into<String>,
        operation: impl Into<String>,
        error: bollard::errors::Error,
    ) -> Self {
        match error {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::NetworkOperationFailed {
                network: network.into(),
                operation: operation.into(),
                status_code,
                message,
            },
            other => Self::Unavailable {
                operation: operation.into(),
                source: other,
            },
        }
    }

    /// Whether the engine itself is unreachable, as opposed to refusing a
    /// particular request
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Unavailable { .. } | Self::OperationTimeout { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NetworkNotFound { .. }
                | Self::NetworkOperationFailed {
                    status_code: 404,
                    ..
                }
        )
    }
}
