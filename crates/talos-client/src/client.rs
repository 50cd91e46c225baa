//! Node management seam.

use crate::error::TalosError;
use crate::models::{ClusterInfo, HealthMessage, ResourceDefinition, ResourceMetadata, ResourceSnapshot};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Stream of health-check progress. Ends cleanly when the check passes; an
/// `Err` item means the check failed.
pub type HealthStream = BoxStream<'static, Result<HealthMessage, TalosError>>;

/// Session with one or more Talos nodes.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Resolves a resource kind by type name or alias. `namespace`, when
    /// given, is the namespace the caller will read from and decides between
    /// kinds sharing an alias.
    async fn resolve_resource_kind(&self, namespace: Option<&str>, name: &str) -> Result<ResourceDefinition, TalosError>;

    /// Reads a single resource.
    async fn get(&self, metadata: &ResourceMetadata) -> Result<ResourceSnapshot, TalosError>;

    /// Starts a cluster health check bounded by `timeout`.
    async fn health_check(&self, timeout: Duration, info: &ClusterInfo) -> Result<HealthStream, TalosError>;
}

/// Opens [`NodeClient`] sessions.
#[async_trait]
pub trait NodeClientFactory: Send + Sync {
    /// Connects to `endpoints` (`host:port`). An empty list uses the
    /// endpoints from the client configuration.
    async fn connect(&self, endpoints: &[String]) -> Result<Box<dyn NodeClient>, TalosError>;
}
