//! Talos Machine Configuration
//!
//! Editable machine configuration documents ([`MachineConfig`]), the
//! structural overlay used to apply administrator patches, adoption of
//! cluster-join secrets from a live config, and baseline generation through
//! the [`ConfigGenerator`] trait.

pub mod document;
pub mod error;
pub mod generator;
pub mod secrets;

pub use document::MachineConfig;
pub use error::ConfigError;
pub use generator::{
    BaselineInput, ConfigGenerator, DEFAULT_KUBERNETES_VERSION, MachineRole, PLACEHOLDER_CLUSTER_NAME,
    PLACEHOLDER_ENDPOINT_HOST, TemplateGenerator,
};
pub use secrets::CLUSTER_SECRET_PATHS;
