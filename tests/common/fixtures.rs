use netwarden::docker::network::ObservedNetwork;

/// Starting state of a host before a reconcile run
pub struct HostFixture {
    pub env: Vec<(&'static str, &'static str)>,
    /// `ufw status numbered` output
    pub listing: &'static str,
    pub active: bool,
    pub default_incoming: &'static str,
    pub networks: Vec<ObservedNetwork>,
    pub interfaces: Vec<&'static str>,
}

const BASE_ENV: [(&str, &str); 2] = [("LAN_CIDR", "192.168.1.0/24"), ("ADMIN_IPV4", "192.168.1.10")];

fn monitoring(subnet: &str) -> ObservedNetwork {
    ObservedNetwork::builder()
        .name("monitoring")
        .driver("bridge")
        .bridge_name("br-monitoring")
        .subnets(vec![subnet.parse().unwrap()])
        .has_attached_containers(true)
        .owner_label("monitoring")
        .build()
}

fn unused(name: &str, owner: Option<&str>) -> ObservedNetwork {
    ObservedNetwork::builder()
        .name(name)
        .driver("bridge")
        .maybe_owner_label(owner)
        .build()
}

impl HostFixture {
    fn base(listing: &'static str) -> Self {
        Self {
            env: BASE_ENV.to_vec(),
            listing,
            active: true,
            default_incoming: "deny",
            networks: vec![monitoring("172.20.0.0/16")],
            interfaces: vec!["lo", "eth0", "docker0", "br-monitoring"],
        }
    }

    /// Firewall enabled with nothing but defaults
    pub fn fresh_host() -> Self {
        Self::base("Status: active\n")
    }

    /// The state left by an earlier hand-written setup: everything open
    pub fn legacy_open_host() -> Self {
        Self::base(
            "\
Status: active

     To                         Action      From
     --                         ------      ----
[ 1] 22                         ALLOW IN    Anywhere
[ 2] 3000                       ALLOW IN    Anywhere
[ 3] 9428/tcp                   ALLOW IN    Anywhere
[ 4] 9090/tcp                   ALLOW IN    192.168.1.0/24
[ 5] 9093                       ALLOW IN    Anywhere
[ 6] 80/tcp                     ALLOW IN    Anywhere
[ 7] 22 (v6)                    ALLOW IN    Anywhere (v6)
[ 8] 3000 (v6)                  ALLOW IN    Anywhere (v6)
[ 9] 9428/tcp (v6)              ALLOW IN    2000::/3
[10] 9323/tcp (v6)              ALLOW IN    fe80::/10
[11] 80/tcp (v6)                ALLOW IN    Anywhere (v6)
",
        )
    }

    /// Tagged rules whose contents no longer match what their tag promises
    pub fn drifted_tags() -> Self {
        Self::base(
            "\
Status: active

     To                         Action      From
     --                         ------      ----
[ 1] 22/tcp                     ALLOW IN    10.0.0.0/8                 # iac:ssh-lan
[ 2] 3000/tcp                   ALLOW IN    192.168.1.0/24             # iac:grafana-lan
[ 3] 3000/tcp                   ALLOW IN    192.168.1.0/24             # iac:grafana-lan
[ 4] 9428/tcp                   ALLOW IN    192.168.1.0/24
[ 5] 9323/tcp on br-old         ALLOW IN    172.20.0.0/16              # iac:docker-metrics-monitoring
[ 6] 3000/tcp                   DENY IN     Anywhere                   # iac:grafana-deny-v4
",
        )
    }

    /// Leftovers from redeployed compose projects
    pub fn stale_bridges() -> Self {
        let mut fixture = Self::base(
            "\
Status: active

     To                         Action      From
     --                         ------      ----
[ 1] Anywhere on br-abe123      ALLOW IN    Anywhere
[ 2] Anywhere on br-0f9e8d      ALLOW IN    172.21.0.0/16
[ 3] Anywhere on eth1           ALLOW IN    Anywhere
[ 4] Anywhere on br-monitoring  ALLOW IN    172.20.0.0/16
[ 5] Anywhere (v6) on br-abe123 ALLOW IN    Anywhere (v6)
",
        );
        fixture.networks.extend([
            unused("grafana_default", Some("grafana-old")),
            unused("scratch_default", None),
            unused("monitoring_default", Some("monitoring")),
            ObservedNetwork::builder()
                .name("apps_default")
                .has_attached_containers(true)
                .build(),
            unused("bridge", None),
        ]);
        fixture
    }

    /// Non-default ports and addressing from the environment
    pub fn custom_ports() -> Self {
        let mut fixture = Self::base(
            "\
Status: active

     To                         Action      From
     --                         ------      ----
[ 1] 2222/tcp                   ALLOW IN    Anywhere
[ 2] 22/tcp                     ALLOW IN    Anywhere
",
        );
        fixture.env = vec![
            ("LAN_CIDR", "10.10.0.0/16"),
            ("ADMIN_IPV4", "10.10.4.2"),
            ("SSH_PORT", "2222"),
            ("GRAFANA_PORT", "3001"),
            ("MONITORING_SUBNET", "172.30.0.0/16"),
            ("STALE_NETWORK_PATTERNS", "*_default, old-*"),
        ];
        fixture.networks = vec![monitoring("172.30.0.0/16"), unused("old-stack", None)];
        fixture
    }
}
