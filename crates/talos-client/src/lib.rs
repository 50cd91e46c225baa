//! Talos Node Client
//!
//! Narrow access to Talos nodes: resolve a resource kind, read a resource,
//! and run a streaming cluster health check.
//!
//! The production implementation drives the `talosctl` binary; a mock
//! implementation is available behind the `test-util` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use talos_client::{NodeClientFactory, TalosctlFactory};
//!
//! # async fn example() -> Result<(), talos_client::TalosError> {
//! let factory = TalosctlFactory::new("talosctl", "/var/run/secrets/talos.dev/config", Duration::from_secs(30));
//! let client = factory.connect(&[]).await?;
//! let kind = client.resolve_resource_kind(Some("config"), "machineconfig").await?;
//! let config = client.get(&kind.metadata("config", "v1alpha1")).await?;
//! println!("{}", config.spec_document()?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod models;
pub mod talosctl;

pub use client::{HealthStream, NodeClient, NodeClientFactory};
pub use error::TalosError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{HealthStep, MockNodeClient, MockNodeClientFactory};
pub use models::*;
pub use talosctl::{TalosctlClient, TalosctlFactory};
