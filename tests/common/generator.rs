/// Generate an end-to-end reconcile test for a host fixture
///
/// Each test plans a dry run, applies, checks the exposure contract and then
/// applies again expecting no changes.
#[macro_export]
macro_rules! generate_reconcile_test {
    ($test_name:ident, $fixture:expr) => {
        #[tokio::test]
        async fn $test_name() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            use $crate::common::{Host, assertions, init_tracing};

            init_tracing();
            let fixture = $fixture;
            let host = Host::from_fixture(&fixture)?;
            let networks_before = host.engine.network_names();

            let planned = host.dry_run().await?;
            assert!(planned.dry_run);
            assert_eq!(host.store.mutation_count(), 0, "dry run touched the firewall");
            assert_eq!(host.engine.network_names(), networks_before, "dry run touched networks");

            let applied = host.apply().await?;
            assert_eq!(planned.mutations, applied.mutations, "dry run and apply disagree");

            let rules = host.store.rules();
            assertions::assert_well_formed(&rules);
            assertions::assert_exposure_contract(&rules, &host.config);
            assertions::assert_tags_converged(&rules, &host.policy);

            for network in fixture.networks.iter().filter(|n| n.has_attached_containers) {
                assert!(
                    host.engine.network(&network.name).is_some(),
                    "network {} with containers was removed",
                    network.name
                );
            }

            let mutations_after_first = host.store.mutation_count();
            let second = host.apply().await?;
            assert!(second.is_converged(), "second run changed: {:?}", second.mutations);
            assert_eq!(host.store.mutation_count(), mutations_after_first);

            Ok(())
        }
    };
}
