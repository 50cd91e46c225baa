//! Operator configuration, read from `TALOS_OPERATOR_*` environment variables.

use crate::error::ControllerError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "TALOS_OPERATOR_";

/// Lease name used for leader election when none is configured.
pub const DEFAULT_LEADER_ELECTION_ID: &str = "talos-operator-leader";

/// Settings for the Machine and Cluster controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Address of the health and metrics endpoint
    pub probe_addr: SocketAddr,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// talosconfig used for cluster health checks
    pub talos_config_path: PathBuf,
    /// talosctl binary
    pub talosctl: PathBuf,
    /// Port probed when a Machine declares none
    pub default_port: u16,
    /// Bound on one TCP connectivity test
    pub probe_timeout: Duration,
    /// Requeue delay after a failed connectivity test
    pub retry_after: Duration,
    /// Bound on one cluster health check
    pub health_check_timeout: Duration,
    /// Compete for a Lease before reconciling. When disabled the operator
    /// must run as a single replica.
    pub leader_elect: bool,
    /// Namespace of the leader Lease
    pub leader_election_namespace: String,
    /// Name of the leader Lease
    pub leader_election_id: String,
    /// Identity written into the Lease; the pod name in a cluster
    pub identity: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            probe_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8081),
            watch_namespace: None,
            talos_config_path: PathBuf::from("/var/run/secrets/talos.dev/config"),
            talosctl: PathBuf::from("talosctl"),
            default_port: crds::DEFAULT_MACHINE_PORT,
            probe_timeout: Duration::from_secs(5),
            retry_after: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(60),
            leader_elect: true,
            leader_election_namespace: "default".to_string(),
            leader_election_id: DEFAULT_LEADER_ELECTION_ID.to_string(),
            identity: "talos-operator".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Unset or empty variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("PROBE_ADDR") {
            config.probe_addr = parse_probe_addr(&v)?;
        }
        config.watch_namespace = get("WATCH_NAMESPACE");
        if let Some(v) = get("TALOS_CONFIG_PATH") {
            config.talos_config_path = PathBuf::from(v);
        }
        if let Some(v) = get("TALOSCTL") {
            config.talosctl = PathBuf::from(v);
        }
        if let Some(v) = get("DEFAULT_PORT") {
            config.default_port = parse_setting("DEFAULT_PORT", &v)?;
        }
        if let Some(v) = get("PROBE_TIMEOUT_SECS") {
            config.probe_timeout = Duration::from_secs(parse_setting("PROBE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("RETRY_AFTER_SECS") {
            config.retry_after = Duration::from_secs(parse_setting("RETRY_AFTER_SECS", &v)?);
        }
        if let Some(v) = get("HEALTH_CHECK_TIMEOUT_SECS") {
            config.health_check_timeout = Duration::from_secs(parse_setting("HEALTH_CHECK_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("LEADER_ELECT") {
            config.leader_elect = parse_setting("LEADER_ELECT", &v)?;
        }
        if let Some(v) = get("LEADER_ELECTION_NAMESPACE") {
            config.leader_election_namespace = v;
        }
        if let Some(v) = get("LEADER_ELECTION_ID") {
            config.leader_election_id = v;
        }
        if let Some(v) = get("POD_NAME").or_else(|| lookup("HOSTNAME").filter(|v| !v.trim().is_empty())) {
            config.identity = v;
        }

        Ok(config)
    }
}

/// Accepts `host:port` or the bare `:port` form.
fn parse_probe_addr(value: &str) -> Result<SocketAddr, ControllerError> {
    let value = value.trim();
    match value.strip_prefix(':') {
        Some(port) => parse_setting::<u16>("PROBE_ADDR", port)
            .map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        None => parse_setting("PROBE_ADDR", value),
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        ControllerError::InvalidConfig(format!("{ENV_PREFIX}{name}={value:?}: {e}"))
    })
}

impl fmt::Display for OperatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OperatorConfig{{probe_addr: {}, watch_namespace: {}, default_port: {}, probe_timeout: {:?}, health_check_timeout: {:?}, leader_election: {}}}",
            self.probe_addr,
            self.watch_namespace.as_deref().unwrap_or("<all>"),
            self.default_port,
            self.probe_timeout,
            self.health_check_timeout,
            if self.leader_elect {
                format!("{}/{} as {}", self.leader_election_namespace, self.leader_election_id, self.identity)
            } else {
                "disabled (single replica)".to_string()
            },
        )
    }
}
