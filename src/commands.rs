//! Wiring for the `bootstrap` and `reconcile` subcommands.

use crate::Result;
use crate::bootstrap::{BootstrapOutcome, Bootstrapper};
use crate::config::{BootstrapConfig, ReconcileConfig};
use crate::docker::network::owner_labels;
use crate::docker::{DockerClient, NetworkEngine};
use crate::host::{InterfaceLister, SysfsInterfaces};
use crate::lock::RunLock;
use crate::policy::PolicyTable;
use crate::reconcile::backup::BackupWriter;
use crate::reconcile::report::ReconcileReport;
use crate::reconcile::stale::StaleResourceDetector;
use crate::reconcile::Reconciler;
use crate::security;
use crate::ufw::{MemoryRuleStore, RuleStore, UfwClient};
use std::sync::Arc;
use tracing::info;

/// `netwarden bootstrap` against the local Docker engine
pub async fn run_bootstrap(config: &BootstrapConfig) -> Result<Vec<BootstrapOutcome>> {
    let _lock = if config.dry_run {
        None
    } else {
        Some(RunLock::acquire(&config.lock_file)?)
    };

    let engine = DockerClient::builder()
        .timeout_duration(config.docker_timeout)
        .owner_label_key(config.owner.key.clone())
        .build()?;

    bootstrap_with(config, Arc::new(engine)).await
}

pub async fn bootstrap_with(
    config: &BootstrapConfig,
    engine: Arc<dyn NetworkEngine>,
) -> Result<Vec<BootstrapOutcome>> {
    let bootstrapper = Bootstrapper::builder()
        .engine(engine)
        .create_if_missing(config.create_if_missing)
        .dry_run(config.dry_run)
        .labels(owner_labels(&config.owner.key, &config.owner.value))
        .build();

    let outcomes = bootstrapper.ensure_all(&config.networks).await?;
    info!(
        networks = config.networks.len(),
        dry_run = config.dry_run,
        "Bootstrap finished"
    );
    Ok(outcomes)
}

/// `netwarden reconcile`, a dry run unless `apply` is set
pub async fn run_reconcile(config: &ReconcileConfig, apply: bool) -> Result<ReconcileReport> {
    let policy = PolicyTable::for_config(config)?;
    let _lock = reconcile_preflight(config, apply)?;

    let ufw = UfwClient::builder().build();
    let engine = DockerClient::builder()
        .timeout_duration(config.docker_timeout)
        .owner_label_key(config.owner.key.clone())
        .build()?;
    engine.ping().await?;

    let store: Arc<dyn RuleStore> = if apply {
        Arc::new(ufw)
    } else {
        Arc::new(simulate(&ufw).await?)
    };
    let backup = apply.then(|| BackupWriter::new(&config.backup_dir));

    reconcile_with(
        config,
        &policy,
        store,
        Arc::new(engine),
        Box::new(SysfsInterfaces::new()),
        !apply,
        backup,
    )
    .await
}

/// Privilege checks ahead of the first ufw call, then the run lock for apply.
/// A dry run reads the rule list too, so it needs root as well.
fn reconcile_preflight(config: &ReconcileConfig, apply: bool) -> Result<Option<RunLock>> {
    security::check_root()?;
    if !apply {
        return Ok(None);
    }
    security::check_capabilities()?;
    Ok(Some(RunLock::acquire(&config.lock_file)?))
}

/// A copy of the live rule list to run a dry run against
pub async fn simulate(store: &dyn RuleStore) -> Result<MemoryRuleStore> {
    let status = store.status().await?;
    let listing = store.raw_listing().await?;
    Ok(MemoryRuleStore::from_listing(status, &listing)?)
}

pub fn detector_for(config: &ReconcileConfig) -> StaleResourceDetector {
    StaleResourceDetector::builder()
        .stale_interface_prefixes(config.stale_interface_prefixes.clone())
        .protected_interfaces(vec![config.monitoring_bridge().to_string()])
        .stale_network_patterns(config.stale_network_patterns.clone())
        .protected_network(config.protected_network.clone())
        .build()
}

pub async fn reconcile_with(
    config: &ReconcileConfig,
    policy: &PolicyTable,
    store: Arc<dyn RuleStore>,
    engine: Arc<dyn NetworkEngine>,
    interfaces: Box<dyn InterfaceLister>,
    dry_run: bool,
    backup: Option<BackupWriter>,
) -> Result<ReconcileReport> {
    let mut reconciler = Reconciler::builder()
        .store(store)
        .engine(engine)
        .interfaces(interfaces)
        .detector(detector_for(config))
        .expected_network(config.monitoring.clone())
        .owner(config.owner.value.clone())
        .dry_run(dry_run)
        .maybe_backup(backup)
        .build();

    Ok(reconciler.run(policy).await?)
}
