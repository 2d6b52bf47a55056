pub mod error;
pub mod memory;
pub mod network;

use crate::docker::error::DockerError;
use crate::docker::network::{BRIDGE_NAME_OPTION, NetworkSpec, ObservedNetwork};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{Ipam, IpamConfig, NetworkCreateRequest};
use bon::bon;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

pub const DEFAULT_OWNER_LABEL_KEY: &str = "com.docker.compose.project";

/// Network operations the bootstrapper and reconciler need from the engine
#[async_trait]
pub trait NetworkEngine: Send + Sync {
    /// Check that the engine answers at all
    async fn ping(&self) -> Result<(), DockerError>;

    /// All networks with their full inspect details
    async fn list_networks(&self) -> Result<Vec<ObservedNetwork>, DockerError>;

    /// Inspect one network by name, `None` if it does not exist
    async fn inspect_network(&self, name: &str) -> Result<Option<ObservedNetwork>, DockerError>;

    /// Create a bridge network with the spec's bridge name and addressing
    async fn create_network(
        &self,
        spec: &NetworkSpec,
        labels: &HashMap<String, String>,
    ) -> Result<(), DockerError>;

    async fn remove_network(&self, name: &str) -> Result<(), DockerError>;
}

#[derive(Debug, Clone)]
enum ConnectionInfo {
    Socket(String),
    Http(String),
    Default,
}

impl ConnectionInfo {
    fn endpoint(&self) -> String {
        match self {
            ConnectionInfo::Socket(path) => path.clone(),
            ConnectionInfo::Http(url) => url.clone(),
            ConnectionInfo::Default => "default socket".to_string(),
        }
    }
}

/// Docker Engine API client scoped to network management
pub struct DockerClient {
    client: Docker,
    timeout_duration: Duration,
    connection_info: ConnectionInfo,
    owner_label_key: String,
}

#[bon]
impl DockerClient {
    #[builder]
    pub fn new(
        #[builder(default = Duration::from_secs(10))] timeout_duration: Duration,
        #[builder(into, default = DEFAULT_OWNER_LABEL_KEY.to_string())] owner_label_key: String,
    ) -> Result<Self, DockerError> {
        let connection_info = connection_from_host(env::var("DOCKER_HOST").ok());
        let client = Self::connect(&connection_info)?;
        debug!(endpoint = %connection_info.endpoint(), "Docker client configured");

        Ok(Self {
            client,
            timeout_duration,
            connection_info,
            owner_label_key,
        })
    }

    fn connect(connection_info: &ConnectionInfo) -> Result<Docker, DockerError> {
        let result = match connection_info {
            ConnectionInfo::Socket(socket_path) => {
                Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            }
            ConnectionInfo::Http(url) => {
                Docker::connect_with_http(url, 120, bollard::API_DEFAULT_VERSION)
            }
            ConnectionInfo::Default => Docker::connect_with_socket_defaults(),
        };

        result.map_err(|e| {
            DockerError::connection_failed(
                connection_info.endpoint(),
                "could not configure Docker client",
                e,
            )
        })
    }

    async fn inspect_raw(&self, name: &str) -> Result<Option<bollard::models::Network>, DockerError> {
        use bollard::query_parameters::InspectNetworkOptionsBuilder;

        let options = InspectNetworkOptionsBuilder::default().build();

        match timeout(
            self.timeout_duration,
            self.client.inspect_network(name, Some(options)),
        )
        .await
        .map_err(|_| DockerError::operation_timeout("inspect network", self.timeout_duration))?
        {
            Ok(network) => Ok(Some(network)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(DockerError::from_api(name, "inspect", e)),
        }
    }
}

/// Pick a connection method from the `DOCKER_HOST` value
fn connection_from_host(docker_host: Option<String>) -> ConnectionInfo {
    match docker_host {
        Some(host) if host.starts_with("unix://") || host.starts_with('/') => {
            ConnectionInfo::Socket(host)
        }
        Some(host) if !host.trim().is_empty() => {
            let url = if host.starts_with("http://") {
                host
            } else {
                host.replace("tcp://", "http://")
            };
            ConnectionInfo::Http(url)
        }
        _ => ConnectionInfo::Default,
    }
}

#[async_trait]
impl NetworkEngine for DockerClient {
    async fn ping(&self) -> Result<(), DockerError> {
        timeout(self.timeout_duration, self.client.ping())
            .await
            .map_err(|_| DockerError::operation_timeout("ping Docker daemon", self.timeout_duration))?
            .map_err(|e| {
                DockerError::connection_failed(
                    self.connection_info.endpoint(),
                    "ping failed",
                    e,
                )
            })?;
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<ObservedNetwork>, DockerError> {
        use bollard::query_parameters::ListNetworksOptionsBuilder;

        let options = ListNetworksOptionsBuilder::default().build();

        let summaries = timeout(
            self.timeout_duration,
            self.client.list_networks(Some(options)),
        )
        .await
        .map_err(|_| DockerError::operation_timeout("list networks", self.timeout_duration))?
        .map_err(|e| DockerError::from_api("*", "list", e))?;

        // The list endpoint leaves `Containers` empty, so every network is
        // inspected individually.
        let mut observed = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id.as_deref() else {
                continue;
            };
            match self.inspect_raw(id).await? {
                Some(network) => {
                    observed.push(ObservedNetwork::from_inspect(&network, &self.owner_label_key)?)
                }
                None => debug!(network_id = %id, "Network vanished between list and inspect"),
            }
        }

        Ok(observed)
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<ObservedNetwork>, DockerError> {
        self.inspect_raw(name)
            .await?
            .map(|network| ObservedNetwork::from_inspect(&network, &self.owner_label_key))
            .transpose()
    }

    async fn create_network(
        &self,
        spec: &NetworkSpec,
        labels: &HashMap<String, String>,
    ) -> Result<(), DockerError> {
        let ipam = spec.subnet.map(|subnet| Ipam {
            driver: Some("default".to_string()),
            config: Some(vec![IpamConfig {
                subnet: Some(subnet.to_string()),
                gateway: spec.gateway.map(|gw| gw.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let options = spec
            .bridge_name
            .as_ref()
            .map(|bridge| HashMap::from([(BRIDGE_NAME_OPTION.to_string(), bridge.clone())]));

        let request = NetworkCreateRequest {
            name: spec.name.clone(),
            driver: Some("bridge".to_string()),
            ipam,
            options,
            labels: Some(labels.clone()),
            ..Default::default()
        };

        timeout(self.timeout_duration, self.client.create_network(request))
            .await
            .map_err(|_| DockerError::operation_timeout("create network", self.timeout_duration))?
            .map_err(|e| DockerError::from_api(&spec.name, "create", e))?;

        info!(network = %spec.name, "Created Docker network");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), DockerError> {
        timeout(self.timeout_duration, self.client.remove_network(name))
            .await
            .map_err(|_| DockerError::operation_timeout("remove network", self.timeout_duration))?
            .map_err(|e| DockerError::from_api(name, "remove", e))
    }
}
