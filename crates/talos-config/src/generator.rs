//! Baseline machine configuration generation.

use crate::document::MachineConfig;
use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;

/// Cluster name used until live secrets are adopted.
pub const PLACEHOLDER_CLUSTER_NAME: &str = "_placeholder";

/// Control-plane host used until live secrets are adopted.
pub const PLACEHOLDER_ENDPOINT_HOST: &str = "1.2.3.4";

/// Kubernetes version rendered into generated configs.
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.34.1";

/// Role a machine plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineRole {
    /// Runs workloads only
    Worker,
    /// Runs etcd and the Kubernetes control plane
    #[serde(rename = "controlplane")]
    ControlPlane,
}

impl fmt::Display for MachineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::ControlPlane => write!(f, "controlplane"),
        }
    }
}

/// Inputs for [`ConfigGenerator::baseline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineInput {
    /// Cluster name
    pub cluster_name: String,
    /// Control-plane endpoint host
    pub endpoint_host: String,
    /// Kubernetes version without the `v` prefix
    pub kubernetes_version: String,
    /// Role of the machine
    pub role: MachineRole,
}

impl BaselineInput {
    /// Placeholder identity for a worker; cluster identity is filled in
    /// later from live secrets.
    #[must_use]
    pub fn placeholder_worker(kubernetes_version: &str) -> Self {
        Self {
            cluster_name: PLACEHOLDER_CLUSTER_NAME.to_string(),
            endpoint_host: PLACEHOLDER_ENDPOINT_HOST.to_string(),
            kubernetes_version: kubernetes_version.to_string(),
            role: MachineRole::Worker,
        }
    }
}

/// Produces baseline machine configs.
pub trait ConfigGenerator: Send + Sync {
    /// Generates a complete baseline document for `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be produced.
    fn baseline(&self, input: &BaselineInput) -> Result<MachineConfig, ConfigError>;
}

/// Generates a minimal `v1alpha1` document from a fixed template.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    install_disk: String,
    install_image: Option<String>,
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self {
            install_disk: "/dev/sda".to_string(),
            install_image: None,
        }
    }
}

impl TemplateGenerator {
    /// Overrides the install disk.
    #[must_use]
    pub fn with_install_disk(mut self, disk: impl Into<String>) -> Self {
        self.install_disk = disk.into();
        self
    }

    /// Sets the installer image.
    #[must_use]
    pub fn with_install_image(mut self, image: impl Into<String>) -> Self {
        self.install_image = Some(image.into());
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    version: &'static str,
    debug: bool,
    persist: bool,
    machine: Machine<'a>,
    cluster: Cluster,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Machine<'a> {
    #[serde(rename = "type")]
    type_: MachineRole,
    cert_sans: Vec<String>,
    kubelet: Kubelet,
    network: Network,
    install: Install<'a>,
    features: Features,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kubelet {
    image: String,
    default_runtime_seccomp_profile_enabled: bool,
    disable_manifests_directory: bool,
}

#[derive(Serialize)]
struct Network {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Install<'a> {
    disk: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    wipe: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Features {
    rbac: bool,
    stable_hostname: bool,
    apid_check_ext_key_usage: bool,
    disk_quota_support: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Cluster {
    control_plane: ControlPlane,
    cluster_name: String,
    network: ClusterNetwork,
    discovery: Discovery,
}

#[derive(Serialize)]
struct ControlPlane {
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterNetwork {
    dns_domain: &'static str,
    pod_subnets: Vec<&'static str>,
    service_subnets: Vec<&'static str>,
}

#[derive(Serialize)]
struct Discovery {
    enabled: bool,
}

impl ConfigGenerator for TemplateGenerator {
    fn baseline(&self, input: &BaselineInput) -> Result<MachineConfig, ConfigError> {
        let version = input.kubernetes_version.trim_start_matches('v');
        let document = Document {
            version: "v1alpha1",
            debug: false,
            persist: true,
            machine: Machine {
                type_: input.role,
                cert_sans: Vec::new(),
                kubelet: Kubelet {
                    image: format!("ghcr.io/siderolabs/kubelet:v{version}"),
                    default_runtime_seccomp_profile_enabled: true,
                    disable_manifests_directory: true,
                },
                network: Network {},
                install: Install {
                    disk: &self.install_disk,
                    image: self.install_image.as_deref(),
                    wipe: false,
                },
                features: Features {
                    rbac: true,
                    stable_hostname: true,
                    apid_check_ext_key_usage: true,
                    disk_quota_support: true,
                },
            },
            cluster: Cluster {
                control_plane: ControlPlane {
                    endpoint: format!("https://{}:6443", input.endpoint_host),
                },
                cluster_name: input.cluster_name.clone(),
                network: ClusterNetwork {
                    dns_domain: "cluster.local",
                    pod_subnets: vec!["10.244.0.0/16"],
                    service_subnets: vec!["10.96.0.0/12"],
                },
                discovery: Discovery { enabled: true },
            },
        };

        MachineConfig::from_value(serde_yaml::to_value(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_worker_baseline() {
        let config = TemplateGenerator::default()
            .baseline(&BaselineInput::placeholder_worker(DEFAULT_KUBERNETES_VERSION))
            .unwrap();

        assert_eq!(config.get_str("version"), Some("v1alpha1"));
        assert_eq!(config.get_str("machine.type"), Some("worker"));
        assert_eq!(config.get_str("machine.kubelet.image"), Some("ghcr.io/siderolabs/kubelet:v1.34.1"));
        assert_eq!(config.get_str("cluster.clusterName"), Some("_placeholder"));
        assert_eq!(config.get_str("cluster.controlPlane.endpoint"), Some("https://1.2.3.4:6443"));
        assert!(config.get("machine.install.image").is_none());
    }

    #[test]
    fn test_install_overrides_and_v_prefix() {
        let input = BaselineInput {
            kubernetes_version: "v1.33.0".to_string(),
            role: MachineRole::ControlPlane,
            ..BaselineInput::placeholder_worker(DEFAULT_KUBERNETES_VERSION)
        };
        let config = TemplateGenerator::default()
            .with_install_disk("/dev/nvme0n1")
            .with_install_image("ghcr.io/siderolabs/installer:v1.11.0")
            .baseline(&input)
            .unwrap();

        assert_eq!(config.get_str("machine.type"), Some("controlplane"));
        assert_eq!(config.get_str("machine.kubelet.image"), Some("ghcr.io/siderolabs/kubelet:v1.33.0"));
        assert_eq!(config.get_str("machine.install.disk"), Some("/dev/nvme0n1"));
        assert_eq!(config.get_str("machine.install.image"), Some("ghcr.io/siderolabs/installer:v1.11.0"));
    }
}
