//! Machine CRD
//!
//! A single Talos node, addressed by its management endpoint.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Port used when a Machine does not declare one.
pub const DEFAULT_MACHINE_PORT: u16 = 6443;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "talos.microscaler.io",
    version = "v1alpha1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.address"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Address of the node's API endpoint (IPv4, IPv6 or hostname)
    /// Accepts `ip` for backward compatibility
    #[serde(default, alias = "ip")]
    pub address: String,

    /// Port of the node's API endpoint; unset or zero means the default port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl MachineSpec {
    /// Port to dial, falling back to `default_port` when unset or zero.
    #[must_use]
    pub fn effective_port(&self, default_port: u16) -> u16 {
        match self.port {
            Some(port) if port != 0 => port,
            _ => default_port,
        }
    }

    /// `address:port` endpoint, bracketing IPv6 literals.
    #[must_use]
    pub fn endpoint(&self, default_port: u16) -> String {
        let port = self.effective_port(default_port);
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, port)
        } else {
            format!("{}:{}", self.address, port)
        }
    }
}

/// Observed state of a Machine, written by the Machine controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Availability and readiness conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_port_defaults() {
        let unset = MachineSpec { address: "10.0.0.1".to_string(), port: None };
        let zero = MachineSpec { address: "10.0.0.1".to_string(), port: Some(0) };
        let set = MachineSpec { address: "10.0.0.1".to_string(), port: Some(50000) };

        assert_eq!(unset.effective_port(DEFAULT_MACHINE_PORT), 6443);
        assert_eq!(zero.effective_port(DEFAULT_MACHINE_PORT), 6443);
        assert_eq!(set.effective_port(DEFAULT_MACHINE_PORT), 50000);
    }

    #[test]
    fn test_endpoint_brackets_ipv6() {
        let v4 = MachineSpec { address: "10.0.0.1".to_string(), port: None };
        let v6 = MachineSpec { address: "fd00::1".to_string(), port: Some(50000) };

        assert_eq!(v4.endpoint(DEFAULT_MACHINE_PORT), "10.0.0.1:6443");
        assert_eq!(v6.endpoint(DEFAULT_MACHINE_PORT), "[fd00::1]:50000");
    }

    #[test]
    fn test_spec_accepts_ip_alias() {
        let spec: MachineSpec = serde_json::from_str(r#"{"ip":"192.168.1.5","port":50000}"#).unwrap();
        assert_eq!(spec.address, "192.168.1.5");
        assert_eq!(spec.port, Some(50000));
    }
}
