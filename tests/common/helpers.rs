use crate::common::fixtures::HostFixture;
use netwarden::commands;
use netwarden::config::ReconcileConfig;
use netwarden::docker::memory::MemoryEngine;
use netwarden::host::StaticInterfaces;
use netwarden::policy::PolicyTable;
use netwarden::reconcile::report::ReconcileReport;
use netwarden::ufw::MemoryRuleStore;
use netwarden::ufw::parser::UfwStatus;
use std::collections::HashMap;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netwarden=debug")
        .with_test_writer()
        .try_init();
}

pub fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A simulated host: firewall, Docker engine and interface list
pub struct Host {
    pub config: ReconcileConfig,
    pub policy: PolicyTable,
    pub store: Arc<MemoryRuleStore>,
    pub engine: Arc<MemoryEngine>,
    pub interfaces: StaticInterfaces,
}

impl Host {
    pub fn from_fixture(fixture: &HostFixture) -> Result<Self, netwarden::Error> {
        let config = ReconcileConfig::from_env(&env_map(&fixture.env))?;
        let policy = PolicyTable::for_config(&config)?;

        let status = UfwStatus {
            active: fixture.active,
            default_incoming: Some(fixture.default_incoming.to_string()),
        };
        let store = MemoryRuleStore::from_listing(status, fixture.listing)?;

        let engine = MemoryEngine::new();
        for network in &fixture.networks {
            engine.add_network(network.clone());
        }

        Ok(Self {
            config,
            policy,
            store: Arc::new(store),
            engine: Arc::new(engine),
            interfaces: StaticInterfaces::new(fixture.interfaces.iter().copied()),
        })
    }

    /// Plan against a copy of the rules, the way `reconcile` without
    /// `--apply` does
    pub async fn dry_run(&self) -> Result<ReconcileReport, netwarden::Error> {
        let simulated = commands::simulate(self.store.as_ref()).await?;
        commands::reconcile_with(
            &self.config,
            &self.policy,
            Arc::new(simulated),
            self.engine.clone(),
            Box::new(self.interfaces.clone()),
            true,
            None,
        )
        .await
    }

    pub async fn apply(&self) -> Result<ReconcileReport, netwarden::Error> {
        commands::reconcile_with(
            &self.config,
            &self.policy,
            self.store.clone(),
            self.engine.clone(),
            Box::new(self.interfaces.clone()),
            false,
            None,
        )
        .await
    }
}
