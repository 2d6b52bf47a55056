#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::docker::memory::MemoryEngine;
    use crate::docker::network::owner_labels;

    fn monitoring_spec() -> NetworkSpec {
        NetworkSpec::builder()
            .name("monitoring")
            .bridge_name("br-monitoring")
            .subnet("172.20.0.0/16".parse().unwrap())
            .gateway("172.20.0.1".parse().unwrap())
            .build()
    }

    #[test]
    fn test_connection_from_host() {
        assert!(matches!(
            connection_from_host(Some("unix:///var/run/docker.sock".to_string())),
            ConnectionInfo::Socket(path) if path == "unix:///var/run/docker.sock"
        ));
        assert!(matches!(
            connection_from_host(Some("/run/user/1000/docker.sock".to_string())),
            ConnectionInfo::Socket(_)
        ));
        assert!(matches!(
            connection_from_host(Some("tcp://10.0.0.5:2375".to_string())),
            ConnectionInfo::Http(url) if url == "http://10.0.0.5:2375"
        ));
        assert!(matches!(
            connection_from_host(Some("http://docker:2375".to_string())),
            ConnectionInfo::Http(url) if url == "http://docker:2375"
        ));
        assert!(matches!(
            connection_from_host(Some("  ".to_string())),
            ConnectionInfo::Default
        ));
        assert!(matches!(connection_from_host(None), ConnectionInfo::Default));
    }

    #[tokio::test]
    async fn test_memory_engine_create_and_inspect() {
        let engine = MemoryEngine::new();
        let labels = owner_labels(DEFAULT_OWNER_LABEL_KEY, "monitoring");

        engine
            .create_network(&monitoring_spec(), &labels)
            .await
            .unwrap();

        let observed = engine.inspect_network("monitoring").await.unwrap().unwrap();
        assert!(!observed.id.is_empty());
        assert_eq!(observed.bridge_name.as_deref(), Some("br-monitoring"));
        assert_eq!(observed.owner_label.as_deref(), Some("monitoring"));
        assert_eq!(observed.driver.as_deref(), Some("bridge"));
        assert_eq!(engine.create_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_engine_rejects_duplicate_create() {
        let engine = MemoryEngine::new();
        let labels = HashMap::new();

        engine.create_network(&monitoring_spec(), &labels).await.unwrap();
        let err = engine
            .create_network(&monitoring_spec(), &labels)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DockerError::NetworkOperationFailed {
                status_code: 409,
                ..
            }
        ));
        assert_eq!(engine.network_names(), vec!["monitoring".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_engine_inspect_missing_is_none() {
        let engine = MemoryEngine::new();
        assert!(engine.inspect_network("ghost").await.unwrap().is_none());

        let err = engine.remove_network("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_memory_engine_refuses_removing_network_in_use() {
        let engine = MemoryEngine::new().with_network(
            ObservedNetwork::builder()
                .name("apps")
                .has_attached_containers(true)
                .build(),
        );

        assert!(engine.remove_network("apps").await.is_err());
        assert_eq!(engine.removal_count(), 0);
        assert!(engine.network("apps").is_some());
    }

    #[tokio::test]
    async fn test_memory_engine_unavailable() {
        let engine = MemoryEngine::new();
        engine.set_unavailable(true);

        let err = engine.ping().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(engine.list_networks().await.unwrap_err().is_unavailable());

        engine.set_unavailable(false);
        assert!(engine.ping().await.is_ok());
    }
}
