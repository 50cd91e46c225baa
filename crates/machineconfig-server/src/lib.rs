//! Machine config provisioning server
//!
//! Serves `GET /machineconfig/new[/{configName}]` to Talos nodes on first
//! boot. Each request:
//!
//! 1. Reads the administrator patch from a ConfigMap
//! 2. Reads the live machine config from a running cluster node
//! 3. Generates a baseline worker config
//! 4. Allocates an address and a unique name
//! 5. Merges baseline, patch, identity and live cluster secrets
//! 6. Registers the node as a `Machine` and returns the merged document
//!
//! Liveness, readiness and Prometheus metrics are served alongside.

pub mod allocator;
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod provision;
pub mod server;

mod provision_test;

pub use allocator::{AllocationError, Ipv4Cidr, allocate};
pub use api::AppState;
pub use config::ServerConfig;
pub use error::{ProvisionError, ServerError};
pub use metrics::Metrics;
pub use provision::{ProvisionRequest, ProvisionedMachine, Provisioner};
