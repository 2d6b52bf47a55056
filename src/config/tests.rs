#[cfg(test)]
mod tests {
    use super::super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn reconcile_env() -> HashMap<String, String> {
        env(&[("LAN_CIDR", "192.168.1.0/24"), ("ADMIN_IPV4", "192.168.1.10")])
    }

    #[test]
    fn test_parse_bool_variants() {
        for value in ["1", "true", "YES", "on"] {
            assert!(parse_bool("X", value).unwrap(), "{value}");
        }
        for value in ["0", "False", "no", "off"] {
            assert!(!parse_bool("X", value).unwrap(), "{value}");
        }
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_parse_list_drops_blanks() {
        assert_eq!(parse_list(" br-, ,veth "), vec!["br-", "veth"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_port_bounds() {
        assert_eq!(parse_port("P", "9428").unwrap(), 9428);
        assert!(parse_port("P", "0").is_err());
        assert!(parse_port("P", "70000").is_err());
    }

    #[test]
    fn test_parse_net_normalizes() {
        assert_eq!(
            parse_net("N", "192.168.1.77/24").unwrap(),
            "192.168.1.0/24".parse::<IpNet>().unwrap()
        );
        assert_eq!(
            parse_net("N", "10.0.0.5").unwrap(),
            "10.0.0.5/32".parse::<IpNet>().unwrap()
        );
        assert!(parse_net("N", "lan").is_err());
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let source = env(&[("DRY_RUN", "  ")]);
        assert_eq!(EnvSource::get(&source, "DRY_RUN"), None);
    }

    #[test]
    fn test_network_var_prefix() {
        assert_eq!(network_var_prefix("apps-v2"), "APPS_V2");
        assert_eq!(network_var_prefix("monitoring"), "MONITORING");
    }

    #[test]
    fn test_bootstrap_defaults() {
        let config = BootstrapConfig::from_env(&env(&[])).unwrap();

        assert!(config.create_if_missing);
        assert!(!config.dry_run);
        assert_eq!(config.docker_timeout, Duration::from_secs(10));
        assert_eq!(config.owner.value, "monitoring");
        assert_eq!(config.networks.len(), 2);

        let monitoring = &config.networks[0];
        assert_eq!(monitoring.name, "monitoring");
        assert_eq!(monitoring.bridge_name.as_deref(), Some("br-monitoring"));
        assert_eq!(monitoring.subnet, Some("172.20.0.0/16".parse().unwrap()));
        assert_eq!(monitoring.gateway, Some("172.20.0.1".parse().unwrap()));

        let apps = &config.networks[1];
        assert_eq!(apps.name, "apps");
        assert_eq!(apps.bridge_name, None);
        assert_eq!(apps.subnet, None);
    }

    #[test]
    fn test_bootstrap_per_network_overrides() {
        let config = BootstrapConfig::from_env(&env(&[
            ("NETWORKS", "apps-v2"),
            ("APPS_V2_SUBNET", "172.30.0.0/24"),
            ("APPS_V2_GATEWAY", "172.30.0.1"),
            ("APPS_V2_BRIDGE_NAME", "br-apps"),
            ("CREATE_IF_MISSING", "0"),
            ("DRY_RUN", "yes"),
            ("DOCKER_TIMEOUT", "500ms"),
        ]))
        .unwrap();

        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].bridge_name.as_deref(), Some("br-apps"));
        assert!(!config.create_if_missing);
        assert!(config.dry_run);
        assert_eq!(config.docker_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_bootstrap_rejects_gateway_outside_subnet() {
        let err = BootstrapConfig::from_env(&env(&[
            ("NETWORKS", "apps"),
            ("APPS_SUBNET", "172.30.0.0/24"),
            ("APPS_GATEWAY", "172.31.0.1"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("APPS_GATEWAY"));
    }

    #[test]
    fn test_bootstrap_rejects_bad_bool() {
        let err = BootstrapConfig::from_env(&env(&[("DRY_RUN", "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "DRY_RUN"));
    }

    #[test]
    fn test_reconcile_requires_lan_and_admin() {
        let err = ReconcileConfig::from_env(&env(&[("ADMIN_IPV4", "10.0.0.2")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable { ref name, .. } if name == "LAN_CIDR"));

        let err = ReconcileConfig::from_env(&env(&[("LAN_CIDR", "10.0.0.0/8")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable { ref name, .. } if name == "ADMIN_IPV4"));
    }

    #[test]
    fn test_reconcile_rejects_ipv6_admin() {
        let mut source = reconcile_env();
        source.insert("ADMIN_IPV4".to_string(), "fd00::10".to_string());

        let err = ReconcileConfig::from_env(&source).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "ADMIN_IPV4"));
    }

    #[test]
    fn test_reconcile_defaults() {
        let config = ReconcileConfig::from_env(&reconcile_env()).unwrap();

        assert_eq!(config.ports, ManagedPorts::default());
        assert_eq!(config.ports.vlogs_ui, 9428);
        assert_eq!(config.monitoring_bridge(), "br-monitoring");
        assert_eq!(config.monitoring_subnet(), Some("172.20.0.0/16".parse().unwrap()));
        assert_eq!(config.protected_network, "monitoring");
        assert_eq!(config.stale_interface_prefixes, vec!["br-"]);
        assert_eq!(config.stale_network_patterns, vec!["*_default"]);
        assert_eq!(config.backup_dir, PathBuf::from(DEFAULT_BACKUP_DIR));
        assert_eq!(config.admin_net(), "192.168.1.10/32".parse().unwrap());
    }

    #[test]
    fn test_reconcile_overrides() {
        let mut source = reconcile_env();
        source.extend(env(&[
            ("SSH_PORT", "2222"),
            ("MONITORING_NETWORK", "observability"),
            ("MONITORING_BRIDGE_NAME", "br-obs"),
            ("STALE_INTERFACE_PREFIXES", "br-,docker_gwbridge"),
            ("BACKUP_DIR", "/tmp/nw-backups"),
        ]));

        let config = ReconcileConfig::from_env(&source).unwrap();
        assert_eq!(config.ports.ssh, 2222);
        assert_eq!(config.monitoring.name, "observability");
        assert_eq!(config.protected_network, "observability");
        assert_eq!(config.monitoring_bridge(), "br-obs");
        assert_eq!(config.stale_interface_prefixes.len(), 2);
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/nw-backups"));
    }

    #[test]
    fn test_reconcile_rejects_bad_port() {
        let mut source = reconcile_env();
        source.insert("GRAFANA_PORT".to_string(), "http".to_string());

        let err = ReconcileConfig::from_env(&source).unwrap_err();
        assert!(err.to_string().contains("GRAFANA_PORT"));
    }

    #[test]
    fn test_catch_all_ranges_are_rejected() {
        for value in ["0.0.0.0/0", "::/0", "10.1.2.3/0"] {
            let mut vars = reconcile_env();
            vars.insert("LAN_CIDR".to_string(), value.to_string());
            let err = ReconcileConfig::from_env(&vars).unwrap_err();
            assert!(err.to_string().contains("LAN_CIDR"), "{value}: {err}");
        }

        let mut vars = reconcile_env();
        vars.insert("MONITORING_SUBNET".to_string(), "0.0.0.0/0".to_string());
        assert!(ReconcileConfig::from_env(&vars).is_err());

        // A host route is narrow enough
        let mut vars = reconcile_env();
        vars.insert("LAN_CIDR".to_string(), "192.168.1.7".to_string());
        let config = ReconcileConfig::from_env(&vars).unwrap();
        assert_eq!(config.lan_cidr.prefix_len(), 32);
    }
}
