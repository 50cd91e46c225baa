//! Unit tests for the provisioning flow

#[cfg(test)]
mod tests {
    use crate::allocator::Ipv4Cidr;
    use crate::config::ServerConfig;
    use crate::error::ProvisionError;
    use crate::provision::{ProvisionRequest, Provisioner};
    use crds::{Machine, MachineSpec};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use resource_store::MemoryStore;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use talos_client::MockNodeClientFactory;
    use talos_config::{MachineConfig, TemplateGenerator};
    use tempfile::TempDir;

    const PATCH_NAMESPACE: &str = "talos-system";

    const LIVE_CONFIG: &str = r"
version: v1alpha1
machine:
  type: controlplane
  token: live-machine-token
  ca:
    crt: LIVE-MACHINE-CA
cluster:
  id: live-cluster-id
  controlPlane:
    endpoint: https://10.0.0.10:6443
  clusterName: homelab
  network:
    dnsDomain: cluster.local
  token: live-bootstrap-token
  ca:
    crt: LIVE-CLUSTER-CA
";

    const PATCH: &str = r"
machine:
  token: patch-token
  install:
    disk: /dev/nvme0n1
  network:
    interfaces:
      - interface: eth0
        dhcp: false
cluster:
  clusterName: from-patch
  secret: patch-secret
";

    struct Fixture {
        machines: MemoryStore<Machine>,
        config_maps: MemoryStore<ConfigMap>,
        nodes: MockNodeClientFactory,
        provisioner: Provisioner,
        namespace_dir: TempDir,
    }

    fn patch_config_map(name: &str, document: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(PATCH_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: document.map(|d| [("machineconfig".to_string(), d.to_string())].into()),
            ..Default::default()
        }
    }

    fn existing_machine(name: &str, address: &str) -> Machine {
        Machine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("machines".to_string()),
                ..Default::default()
            },
            spec: MachineSpec {
                address: address.to_string(),
                port: None,
            },
            status: None,
        }
    }

    fn fixture(cidr: Option<&str>) -> Fixture {
        let namespace_dir = TempDir::new().unwrap();
        let namespace_file = namespace_dir.path().join("namespace");
        std::fs::write(&namespace_file, format!("{PATCH_NAMESPACE}\n")).unwrap();

        let config = ServerConfig {
            namespace_file,
            machine_cidr: cidr.map(|c| c.parse::<Ipv4Cidr>().unwrap()),
            ..ServerConfig::default()
        };

        let machines = MemoryStore::new();
        let config_maps = MemoryStore::new();
        config_maps.insert(patch_config_map("default-machine-config", Some(PATCH)));
        let nodes = MockNodeClientFactory::new().with_machine_config(LIVE_CONFIG);

        let provisioner = Provisioner::new(
            Arc::new(config),
            Arc::new(machines.clone()),
            Arc::new(config_maps.clone()),
            Arc::new(nodes.clone()),
            Arc::new(TemplateGenerator::default()),
        );

        Fixture {
            machines,
            config_maps,
            nodes,
            provisioner,
            namespace_dir,
        }
    }

    fn parse(document: &[u8]) -> MachineConfig {
        MachineConfig::from_yaml(std::str::from_utf8(document).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_live_secrets_override_patch() {
        // Setup: patch sets its own token, cluster name and secret
        let f = fixture(Some("10.0.0.0/30"));

        let provisioned = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap();
        let merged = parse(&provisioned.document);

        assert_eq!(merged.get_str("machine.token"), Some("live-machine-token"));
        assert_eq!(merged.get_str("machine.ca.crt"), Some("LIVE-MACHINE-CA"));
        assert_eq!(merged.get_str("cluster.clusterName"), Some("homelab"));
        assert_eq!(merged.get_str("cluster.controlPlane.endpoint"), Some("https://10.0.0.10:6443"));
        assert_eq!(merged.get_str("cluster.network.dnsDomain"), Some("cluster.local"));
        assert!(merged.get("cluster.secret").is_none(), "Secret absent from the live config must be dropped");
    }

    #[tokio::test]
    async fn test_patch_overrides_baseline() {
        let f = fixture(None);

        let provisioned = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap();
        let merged = parse(&provisioned.document);

        assert_eq!(merged.get_str("machine.install.disk"), Some("/dev/nvme0n1"));
        assert_eq!(merged.get_str("machine.type"), Some("worker"), "Baseline role is kept");
    }

    #[tokio::test]
    async fn test_registers_machine_with_allocated_address() {
        // Setup: first two addresses of the CIDR already in use
        let f = fixture(Some("10.0.0.0/30"));
        f.machines.insert(existing_machine("node-a", "10.0.0.0"));
        f.machines.insert(existing_machine("node-b", "10.0.0.1"));

        let provisioned = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap();

        assert_eq!(provisioned.address, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(f.machines.create_count(), 1);

        let name = provisioned.machine.metadata.name.clone().unwrap();
        assert!(name.starts_with("nucas-node-"));
        let stored = f.machines.snapshot("machines", &name).expect("Machine should be stored");
        assert_eq!(stored.spec.address, "10.0.0.2");
        assert_eq!(stored.spec.port, Some(50000));

        let merged = parse(&provisioned.document);
        assert_eq!(merged.hostname(), Some(name.as_str()), "Hostname must match the Machine name");
        assert_eq!(merged.primary_interface_addresses(), vec!["10.0.0.2/30"]);
    }

    #[tokio::test]
    async fn test_without_cidr_registers_empty_address() {
        let f = fixture(None);

        let provisioned = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap();

        assert!(provisioned.address.is_none());
        assert_eq!(provisioned.machine.spec.address, "");
        assert!(parse(&provisioned.document).primary_interface_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_named_config_is_used() {
        // Setup: a second patch with a different install disk
        let f = fixture(None);
        f.config_maps.insert(patch_config_map(
            "storage-nodes",
            Some("machine:\n  install:\n    disk: /dev/sdb\n"),
        ));
        let request = ProvisionRequest {
            config_name: Some("storage-nodes".to_string()),
            ..Default::default()
        };

        let provisioned = f.provisioner.provision(&request).await.unwrap();

        assert_eq!(parse(&provisioned.document).get_str("machine.install.disk"), Some("/dev/sdb"));
    }

    #[tokio::test]
    async fn test_missing_patch_creates_nothing() {
        let f = fixture(Some("10.0.0.0/30"));
        let request = ProvisionRequest {
            config_name: Some("does-not-exist".to_string()),
            ..Default::default()
        };

        let err = f.provisioner.provision(&request).await.unwrap_err();

        assert!(matches!(err, ProvisionError::PatchNotFound { ref namespace, ref name }
            if namespace == PATCH_NAMESPACE && name == "does-not-exist"));
        assert_eq!(f.machines.create_count(), 0);
    }

    #[tokio::test]
    async fn test_config_map_without_key_is_empty_patch() {
        let f = fixture(None);
        f.config_maps.insert(patch_config_map("empty", None));
        let request = ProvisionRequest {
            config_name: Some("empty".to_string()),
            ..Default::default()
        };

        let provisioned = f.provisioner.provision(&request).await.unwrap();

        assert_eq!(parse(&provisioned.document).get_str("machine.install.disk"), Some("/dev/sda"));
    }

    #[tokio::test]
    async fn test_invalid_patch_is_rejected() {
        let f = fixture(None);
        f.config_maps.insert(patch_config_map("broken", Some("- just\n- a list\n")));
        let request = ProvisionRequest {
            config_name: Some("broken".to_string()),
            ..Default::default()
        };

        let err = f.provisioner.provision(&request).await.unwrap_err();

        assert!(matches!(err, ProvisionError::InvalidPatch(_)));
        assert_eq!(f.machines.create_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_cidr_creates_nothing() {
        // Setup: every address of a /30 is taken
        let f = fixture(Some("10.0.0.0/30"));
        for (i, address) in ["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3"].iter().enumerate() {
            f.machines.insert(existing_machine(&format!("node-{i}"), address));
        }

        let err = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap_err();

        assert!(matches!(err, ProvisionError::AddressesExhausted(_)));
        assert_eq!(err.message(), "no more IPs available in CIDR");
        assert_eq!(f.machines.create_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_fails() {
        let f = fixture(None);
        f.nodes.set_connect_error("connection refused");

        let err = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap_err();

        assert!(matches!(err, ProvisionError::TalosConnect(_)));
        assert_eq!(f.machines.create_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_machine_config_kind_fails() {
        let f = fixture(None);
        let provisioner = Provisioner::new(
            Arc::new(f.provisioner.config().clone()),
            Arc::new(f.machines.clone()),
            Arc::new(f.config_maps.clone()),
            Arc::new(MockNodeClientFactory::new()),
            Arc::new(TemplateGenerator::default()),
        );

        let err = provisioner.provision(&ProvisionRequest::default()).await.unwrap_err();

        assert!(matches!(err, ProvisionError::ResolveKind(_)));
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let f = fixture(Some("10.0.0.0/30"));
        f.machines.fail_creates(true);

        let err = f.provisioner.provision(&ProvisionRequest::default()).await.unwrap_err();

        assert!(matches!(err, ProvisionError::CreateMachine(_)));
        assert!(f.machines.all().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_namespace_file_falls_back() {
        // Setup: namespace file missing, configured namespace holds the patch
        let f = fixture(None);
        let config = ServerConfig {
            namespace: PATCH_NAMESPACE.to_string(),
            namespace_file: f.namespace_dir.path().join("missing"),
            ..ServerConfig::default()
        };
        let provisioner = Provisioner::new(
            Arc::new(config),
            Arc::new(f.machines.clone()),
            Arc::new(f.config_maps.clone()),
            Arc::new(f.nodes.clone()),
            Arc::new(TemplateGenerator::default()),
        );

        let provisioned = provisioner.provision(&ProvisionRequest::default()).await;

        assert!(provisioned.is_ok(), "Patch should be found in the configured namespace");
    }
}
