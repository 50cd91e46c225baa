//! Assembles the machine config for a first-boot node and registers the node
//! as a Machine.
//!
//! Precedence, lowest first: generated baseline, administrator patch,
//! machine identity (hostname and address), live cluster secrets.

use crate::allocator;
use crate::config::{DEFAULT_CONFIG_NAME, PATCH_KEY, ServerConfig};
use crate::error::ProvisionError;
use crate::naming::unique_machine_name;
use crds::{Machine, MachineSpec};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use resource_store::{ResourceStore, StoreError};
use std::net::Ipv4Addr;
use std::sync::Arc;
use talos_client::NodeClientFactory;
use talos_config::{BaselineInput, ConfigGenerator, MachineConfig};
use tracing::{debug, info, warn};

/// Talos namespace of the machine config resource.
pub const MACHINE_CONFIG_NAMESPACE: &str = "config";

/// Resource kind of the machine config.
pub const MACHINE_CONFIG_KIND: &str = "machineconfig";

/// Id of the machine config resource.
pub const MACHINE_CONFIG_ID: &str = "v1alpha1";

/// Identity a node reports when asking for its config. Only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// SMBIOS UUID
    pub uuid: Option<String>,
    /// Serial number
    pub serial: Option<String>,
    /// MAC address of the booting interface
    pub mac: Option<String>,
    /// Hostname, if any
    pub hostname: Option<String>,
    /// Patch ConfigMap to apply
    pub config_name: Option<String>,
}

impl ProvisionRequest {
    /// Patch ConfigMap name, falling back to the default.
    #[must_use]
    pub fn config_name(&self) -> &str {
        self.config_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CONFIG_NAME)
    }
}

/// Result of a successful provisioning request.
#[derive(Debug, Clone)]
pub struct ProvisionedMachine {
    /// The stored Machine record
    pub machine: Machine,
    /// Allocated address, when a CIDR is configured
    pub address: Option<Ipv4Addr>,
    /// The merged config
    pub config: MachineConfig,
    /// The merged config, serialized
    pub document: Vec<u8>,
}

/// Handles provisioning requests.
///
/// Holds no state across requests. The address scan and the Machine
/// creation are not atomic, so concurrent requests may receive the same
/// address; deployments must serialize first boots to rule that out.
pub struct Provisioner {
    config: Arc<ServerConfig>,
    machines: Arc<dyn ResourceStore<Machine>>,
    config_maps: Arc<dyn ResourceStore<ConfigMap>>,
    nodes: Arc<dyn NodeClientFactory>,
    generator: Arc<dyn ConfigGenerator>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner over the given collaborators.
    pub fn new(
        config: Arc<ServerConfig>,
        machines: Arc<dyn ResourceStore<Machine>>,
        config_maps: Arc<dyn ResourceStore<ConfigMap>>,
        nodes: Arc<dyn NodeClientFactory>,
        generator: Arc<dyn ConfigGenerator>,
    ) -> Self {
        Self {
            config,
            machines,
            config_maps,
            nodes,
            generator,
        }
    }

    /// Server configuration in use.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs one provisioning request end to end.
    ///
    /// No Machine is created unless every earlier step succeeded; the
    /// Machine is created before the document is handed back.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as a [`ProvisionError`].
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedMachine, ProvisionError> {
        let config_name = request.config_name();
        info!(
            uuid = request.uuid.as_deref().unwrap_or_default(),
            serial = request.serial.as_deref().unwrap_or_default(),
            mac = request.mac.as_deref().unwrap_or_default(),
            hostname = request.hostname.as_deref().unwrap_or_default(),
            config_name,
            "Provisioning machine"
        );

        let patch = self.load_patch(config_name).await?;
        let live = self.load_live_config().await?;

        let mut merged = self
            .generator
            .baseline(&BaselineInput::placeholder_worker(&self.config.kubernetes_version))
            .map_err(ProvisionError::Generate)?;

        let existing = self
            .machines
            .list(None, None)
            .await
            .map_err(ProvisionError::ListMachines)?;

        let address = match &self.config.machine_cidr {
            Some(cidr) => {
                let address = allocator::allocate(cidr, existing.iter().map(|m| m.spec.address.as_str()))
                    .map_err(ProvisionError::AddressesExhausted)?;
                debug!("Allocated {} from {}", address, cidr);
                Some(address)
            }
            None => None,
        };

        let name = unique_machine_name(
            self.machines.as_ref(),
            &self.config.machines_namespace,
            &self.config.machine_name_prefix,
        )
        .await?;

        merged.overlay(&patch);
        merged.set_hostname(&name);
        if let (Some(address), Some(cidr)) = (address, &self.config.machine_cidr)
            && !merged.set_primary_interface_address(&cidr.with_host(address))
        {
            debug!("No network interface declared, leaving addresses untouched");
        }
        merged.adopt_cluster_secrets(&live);

        let document = merged.to_bytes().map_err(ProvisionError::Serialize)?;

        let machine = Machine {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.config.machines_namespace.clone()),
                ..Default::default()
            },
            spec: MachineSpec {
                address: address.map(|a| a.to_string()).unwrap_or_default(),
                port: Some(self.config.machine_port),
            },
            status: None,
        };
        let machine = self
            .machines
            .create(&self.config.machines_namespace, &machine)
            .await
            .map_err(ProvisionError::CreateMachine)?;

        info!(
            "Registered machine {}/{} with address {}",
            self.config.machines_namespace,
            name,
            address.map_or_else(|| "<none>".to_string(), |a| a.to_string())
        );

        Ok(ProvisionedMachine {
            machine,
            address,
            config: merged,
            document,
        })
    }

    /// Namespace of the server's own service account, falling back to the
    /// configured namespace.
    async fn patch_namespace(&self) -> String {
        match tokio::fs::read_to_string(&self.config.namespace_file).await {
            Ok(ns) if !ns.trim().is_empty() => ns.trim().to_string(),
            Ok(_) => {
                warn!(
                    "Namespace file {} is empty, using {}",
                    self.config.namespace_file.display(),
                    self.config.namespace
                );
                self.config.namespace.clone()
            }
            Err(e) => {
                warn!(
                    "Could not read namespace file {}: {}, using {}",
                    self.config.namespace_file.display(),
                    e,
                    self.config.namespace
                );
                self.config.namespace.clone()
            }
        }
    }

    async fn load_patch(&self, config_name: &str) -> Result<MachineConfig, ProvisionError> {
        let namespace = self.patch_namespace().await;
        let config_map = match self.config_maps.get(&namespace, config_name).await {
            Ok(cm) => cm,
            Err(StoreError::NotFound(_)) => {
                return Err(ProvisionError::PatchNotFound {
                    namespace,
                    name: config_name.to_string(),
                });
            }
            Err(e) => return Err(ProvisionError::PatchRead(e)),
        };

        let document = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(PATCH_KEY))
            .map(String::as_str)
            .unwrap_or_default();
        if document.is_empty() {
            debug!("Patch {}/{} has no {} key, applying nothing", namespace, config_name, PATCH_KEY);
        }
        MachineConfig::from_yaml(document).map_err(ProvisionError::InvalidPatch)
    }

    async fn load_live_config(&self) -> Result<MachineConfig, ProvisionError> {
        let client = self.nodes.connect(&[]).await.map_err(ProvisionError::TalosConnect)?;
        let kind = client
            .resolve_resource_kind(Some(MACHINE_CONFIG_NAMESPACE), MACHINE_CONFIG_KIND)
            .await
            .map_err(ProvisionError::ResolveKind)?;
        let snapshot = client
            .get(&kind.metadata(MACHINE_CONFIG_NAMESPACE, MACHINE_CONFIG_ID))
            .await
            .map_err(ProvisionError::LiveConfig)?;
        let document = snapshot
            .spec_document()
            .map_err(|e| ProvisionError::InvalidLiveConfig(e.into()))?;
        MachineConfig::from_yaml(&document).map_err(ProvisionError::InvalidLiveConfig)
    }
}
