use crate::docker::NetworkEngine;
use crate::docker::error::DockerError;
use crate::docker::network::{NetworkSpec, ObservedNetwork};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory network engine used by tests and local simulation
///
/// Networks are kept in insertion order. Creation assigns the owner label
/// from the labels passed in, the same way the real engine stores them.
#[derive(Default)]
pub struct MemoryEngine {
    networks: Mutex<Vec<ObservedNetwork>>,
    owner_label_key: String,
    unavailable: AtomicBool,
    creates: AtomicUsize,
    removals: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_owner_label_key(crate::docker::DEFAULT_OWNER_LABEL_KEY)
    }

    pub fn with_owner_label_key(key: impl Into<String>) -> Self {
        Self {
            owner_label_key: key.into(),
            ..Default::default()
        }
    }

    /// Seed an existing network
    pub fn with_network(self, network: ObservedNetwork) -> Self {
        self.add_network(network);
        self
    }

    pub fn add_network(&self, mut network: ObservedNetwork) {
        if network.id.is_empty() {
            network.id = self.allocate_id();
        }
        self.lock().push(network);
    }

    /// Make every subsequent call fail as if the daemon were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn network(&self, name: &str) -> Option<ObservedNetwork> {
        self.lock().iter().find(|n| n.name == name).cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.lock().iter().map(|n| n.name.clone()).collect()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn removal_count(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("mem{:08x}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ObservedNetwork>> {
        // A panicking test thread must not poison the fake for later asserts
        self.networks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self, operation: &str) -> Result<(), DockerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DockerError::operation_timeout(
                operation,
                std::time::Duration::ZERO,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkEngine for MemoryEngine {
    async fn ping(&self) -> Result<(), DockerError> {
        self.check_available("ping Docker daemon")
    }

    async fn list_networks(&self) -> Result<Vec<ObservedNetwork>, DockerError> {
        self.check_available("list networks")?;
        Ok(self.lock().clone())
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<ObservedNetwork>, DockerError> {
        self.check_available("inspect network")?;
        Ok(self.network(name))
    }

    async fn create_network(
        &self,
        spec: &NetworkSpec,
        labels: &HashMap<String, String>,
    ) -> Result<(), DockerError> {
        self.check_available("create network")?;

        let mut networks = self.lock();
        if networks.iter().any(|n| n.name == spec.name) {
            return Err(DockerError::NetworkOperationFailed {
                network: spec.name.clone(),
                operation: "create".to_string(),
                status_code: 409,
                message: format!("network with name {} already exists", spec.name),
            });
        }

        networks.push(ObservedNetwork {
            id: self.allocate_id(),
            name: spec.name.clone(),
            driver: Some("bridge".to_string()),
            bridge_name: spec.bridge_name.clone(),
            subnets: spec.subnet.into_iter().collect(),
            gateway: spec.gateway,
            has_attached_containers: false,
            owner_label: labels.get(&self.owner_label_key).cloned(),
        });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), DockerError> {
        self.check_available("remove network")?;

        let mut networks = self.lock();
        let Some(position) = networks.iter().position(|n| n.name == name) else {
            return Err(DockerError::network_not_found(name));
        };
        if networks[position].has_attached_containers {
            return Err(DockerError::NetworkOperationFailed {
                network: name.to_string(),
                operation: "remove".to_string(),
                status_code: 403,
                message: "error while removing network: network has active endpoints"
                    .to_string(),
            });
        }

        networks.remove(position);
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
