//! Server configuration, read from `TALOS_OPERATOR_*` environment variables.

use crate::allocator::Ipv4Cidr;
use crate::error::ServerError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use talos_config::DEFAULT_KUBERNETES_VERSION;

/// Prefix of every environment variable read by the server.
pub const ENV_PREFIX: &str = "TALOS_OPERATOR_";

/// Name of the patch ConfigMap used when a request names none.
pub const DEFAULT_CONFIG_NAME: &str = "default-machine-config";

/// ConfigMap key holding the patch document.
pub const PATCH_KEY: &str = "machineconfig";

/// Provisioning server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Path of the talosconfig used to read the live cluster config
    pub talos_config_path: PathBuf,
    /// talosctl binary
    pub talosctl: PathBuf,
    /// Timeout for one talosctl invocation
    pub command_timeout: Duration,
    /// Namespace of the patch ConfigMaps when the service account namespace
    /// cannot be read
    pub namespace: String,
    /// Service account namespace file
    pub namespace_file: PathBuf,
    /// Addresses are allocated from this network when set
    pub machine_cidr: Option<Ipv4Cidr>,
    /// Namespace new Machines are created in
    pub machines_namespace: String,
    /// Port recorded on new Machines
    pub machine_port: u16,
    /// Kubernetes version of the generated baseline
    pub kubernetes_version: String,
    /// Prefix of generated machine names
    pub machine_name_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4242,
            talos_config_path: PathBuf::from("/var/run/secrets/talos.dev/config"),
            talosctl: PathBuf::from("talosctl"),
            command_timeout: Duration::from_secs(30),
            namespace: "default".to_string(),
            namespace_file: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/namespace"),
            machine_cidr: None,
            machines_namespace: "machines".to_string(),
            machine_port: 50000,
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            machine_name_prefix: "nucas-node-".to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidSetting`] for unparseable values.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which receives full
    /// variable names. Unset or empty variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidSetting`] for unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("PORT") {
            config.port = parse_setting("PORT", &v)?;
        }
        if let Some(v) = get("TALOS_CONFIG_PATH") {
            config.talos_config_path = PathBuf::from(v);
        }
        if let Some(v) = get("TALOSCTL") {
            config.talosctl = PathBuf::from(v);
        }
        if let Some(v) = get("COMMAND_TIMEOUT_SECS") {
            config.command_timeout = Duration::from_secs(parse_setting("COMMAND_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("NAMESPACE") {
            config.namespace = v;
        }
        if let Some(v) = get("NAMESPACE_FILE") {
            config.namespace_file = PathBuf::from(v);
        }
        if let Some(v) = get("MACHINE_CIDR") {
            config.machine_cidr = Some(parse_setting("MACHINE_CIDR", &v)?);
        }
        if let Some(v) = get("MACHINES_NAMESPACE") {
            config.machines_namespace = v;
        }
        if let Some(v) = get("MACHINE_PORT") {
            config.machine_port = parse_setting("MACHINE_PORT", &v)?;
        }
        if let Some(v) = get("KUBERNETES_VERSION") {
            config.kubernetes_version = v;
        }
        if let Some(v) = get("MACHINE_NAME_PREFIX") {
            config.machine_name_prefix = v;
        }

        Ok(config)
    }

    /// Socket address to listen on.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T, ServerError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ServerError::InvalidSetting {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServerConfig{{port: {}, namespace: {}, talos_config_path: {}, machine_cidr: {}, machines_namespace: {}}}",
            self.port,
            self.namespace,
            self.talos_config_path.display(),
            self.machine_cidr.map_or_else(|| "<unset>".to_string(), |c| c.to_string()),
            self.machines_namespace,
        )
    }
}
