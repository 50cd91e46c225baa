//! Cluster-join secrets.
//!
//! These fields tie a node to an existing cluster. When a new machine's
//! config is assembled they are always copied from the live cluster config,
//! overriding whatever the baseline or an administrator patch said.

use crate::document::MachineConfig;
use tracing::debug;

/// Dotted paths of the fields adopted from the live cluster config.
pub const CLUSTER_SECRET_PATHS: [&str; 9] = [
    "machine.token",
    "machine.ca.crt",
    "cluster.id",
    "cluster.secret",
    "cluster.controlPlane.endpoint",
    "cluster.clusterName",
    "cluster.network",
    "cluster.token",
    "cluster.ca.crt",
];

impl MachineConfig {
    /// Copies every [`CLUSTER_SECRET_PATHS`] field from `live`. A field
    /// missing from `live` is removed here as well.
    pub fn adopt_cluster_secrets(&mut self, live: &MachineConfig) {
        for path in CLUSTER_SECRET_PATHS {
            match live.get(path) {
                Some(value) if !value.is_null() => self.set(path, value.clone()),
                _ => {
                    if self.remove(path).is_some() {
                        debug!("Dropped {} absent from live config", path);
                    }
                }
            }
        }
    }
}
