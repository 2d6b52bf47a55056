pub mod error;


use crate::bootstrap::error::BootstrapError;
use crate::docker::NetworkEngine;
use crate::docker::network::{self, NetworkSpec, ObservedNetwork};
use bon::bon;
use ipnet::IpNet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// What `ensure_network` did for one network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyPresent,
    Created,
    WouldCreate,
}

/// Makes sure externally managed Docker networks exist with the declared
/// addressing. Existing networks are validated, never reconfigured.
pub struct Bootstrapper {
    engine: Arc<dyn NetworkEngine>,
    create_if_missing: bool,
    dry_run: bool,
    labels: HashMap<String, String>,
}

#[bon]
impl Bootstrapper {
    #[builder]
    pub fn new(
        engine: Arc<dyn NetworkEngine>,
        #[builder(default = true)] create_if_missing: bool,
        #[builder(default)] dry_run: bool,
        #[builder(default)] labels: HashMap<String, String>,
    ) -> Self {
        Self {
            engine,
            create_if_missing,
            dry_run,
            labels,
        }
    }

    /// Ensure every network in order, stopping at the first failure
    pub async fn ensure_all(&self, specs: &[NetworkSpec]) -> Result<Vec<BootstrapOutcome>> {
        self.engine
            .ping()
            .await
            .map_err(|e| BootstrapError::engine("ping", e))?;

        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            outcomes.push(self.ensure_network(spec).await?);
        }
        Ok(outcomes)
    }

    pub async fn ensure_network(&self, spec: &NetworkSpec) -> Result<BootstrapOutcome> {
        if spec.name.trim().is_empty() {
            return Err(BootstrapError::invalid_spec("network name must not be empty"));
        }

        if let Some(existing) = self.inspect(&spec.name).await? {
            validate(spec, &existing)?;
            info!(
                network = %spec.name,
                bridge = existing.bridge_name.as_deref().unwrap_or("-"),
                "Network already present and matches spec"
            );
            return Ok(BootstrapOutcome::AlreadyPresent);
        }

        if !self.create_if_missing {
            return Err(BootstrapError::NetworkMissing {
                network: spec.name.clone(),
            });
        }

        if let Some(requested) = spec.subnet {
            let live = self
                .engine
                .list_networks()
                .await
                .map_err(|e| BootstrapError::engine("list networks", e))?;

            if let Some((existing_network, existing)) = find_overlap(&requested, &live) {
                return Err(BootstrapError::SubnetOverlap {
                    network: spec.name.clone(),
                    requested,
                    existing_network: existing_network.to_string(),
                    existing,
                });
            }
        }

        if self.dry_run {
            info!(
                network = %spec.name,
                bridge = spec.bridge_name.as_deref().unwrap_or("-"),
                subnet = ?spec.subnet,
                gateway = ?spec.gateway,
                "DRY-RUN: would create network"
            );
            return Ok(BootstrapOutcome::WouldCreate);
        }

        info!(
            network = %spec.name,
            bridge = spec.bridge_name.as_deref().unwrap_or("-"),
            subnet = ?spec.subnet,
            "Creating network"
        );
        self.engine
            .create_network(spec, &self.labels)
            .await
            .map_err(|e| BootstrapError::engine("create network", e))?;

        let created = self
            .inspect(&spec.name)
            .await?
            .ok_or_else(|| BootstrapError::CreationNotVisible {
                network: spec.name.clone(),
            })?;
        validate(spec, &created)?;

        info!(network = %spec.name, id = %created.id, "Network created and verified");
        Ok(BootstrapOutcome::Created)
    }

    async fn inspect(&self, name: &str) -> Result<Option<ObservedNetwork>> {
        self.engine
            .inspect_network(name)
            .await
            .map_err(|e| BootstrapError::engine("inspect network", e))
    }
}

/// Fail on the first field that disagrees with the spec
fn validate(spec: &NetworkSpec, observed: &ObservedNetwork) -> Result<()> {
    let mismatches = network::compare(spec, observed);
    for mismatch in &mismatches {
        warn!(
            network = %spec.name,
            field = %mismatch.field,
            expected = %mismatch.expected,
            actual = %mismatch.actual,
            "Network does not match spec"
        );
    }

    match mismatches.into_iter().next() {
        Some(mismatch) => Err(BootstrapError::NetworkMismatch {
            network: spec.name.clone(),
            field: mismatch.field,
            expected: mismatch.expected,
            actual: mismatch.actual,
        }),
        None => Ok(()),
    }
}

/// First live network with a subnet sharing addresses with `requested`
pub fn find_overlap<'a>(
    requested: &IpNet,
    live: &'a [ObservedNetwork],
) -> Option<(&'a str, IpNet)> {
    for net in live {
        for subnet in &net.subnets {
            if network::nets_overlap(requested, subnet) {
                debug!(
                    requested = %requested,
                    network = %net.name,
                    existing = %subnet,
                    "Subnet overlap detected"
                );
                return Some((net.name.as_str(), *subnet));
            }
        }
    }
    None
}
