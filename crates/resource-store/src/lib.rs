//! Resource Store
//!
//! Narrow Get/List/Create/Update-Status access to namespaced Kubernetes
//! objects. Controllers and the provisioning server depend on the
//! [`ResourceStore`] trait so that they can be tested against the in-memory
//! [`MemoryStore`] (enabled with the `test-util` feature).

pub mod error;
pub mod kube_store;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod store;

pub use error::{IgnoreNotFound, StoreError};
pub use kube_store::KubeStore;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use store::ResourceStore;
