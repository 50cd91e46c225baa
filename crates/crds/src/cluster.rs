//! Cluster CRD
//!
//! Groups Machines into a Talos cluster. Members are referenced by label
//! selector and resolved on every reconcile.

use crate::condition::Condition;
use crate::selector::MachineSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "talos.microscaler.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Control-plane node set
    pub nodes: MachineSet,

    /// Worker node sets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_sets: Vec<MachineSet>,
}

/// A named group of Machines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSet {
    /// Set name
    #[serde(default)]
    pub name: String,

    /// Selects the Machines belonging to this set
    #[serde(default)]
    pub selector: MachineSelector,

    /// Name of the machine config patch applied to members of this set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// Observed state of a Cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Cluster conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
