//! Talos Cluster Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the operator and the
//! provisioning server, plus the condition and selector helpers that operate
//! on them.

pub mod cluster;
pub mod condition;
pub mod machine;
pub mod selector;

pub use cluster::*;
pub use condition::*;
pub use machine::*;
pub use selector::*;
