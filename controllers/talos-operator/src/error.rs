//! Controller-specific error types.

use crds::SelectorError;
use kube::Error as KubeError;
use resource_store::StoreError;
use std::time::Duration;
use talos_client::TalosError;
use thiserror::Error;

/// Errors that can occur in the Talos operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Talos node API error
    #[error("Talos error: {0}")]
    Talos(#[from] TalosError),

    /// Machine endpoint could not be reached
    #[error("Connectivity test to {endpoint} failed: {message}")]
    ConnectivityTestFailed {
        /// Probed `address:port`
        endpoint: String,
        /// Probe failure
        message: String,
        /// Requeue delay
        retry_after: Duration,
    },

    /// Cluster health check failed or timed out
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// Cluster node selector is empty or malformed
    #[error("Invalid selector for cluster {cluster}: {source}")]
    InvalidSelector {
        /// Cluster namespace/name
        cluster: String,
        /// Validation failure
        source: SelectorError,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry setup failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe endpoint failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// The leader lease was lost
    #[error("Leadership lost: {0}")]
    LeadershipLost(String),
}

impl ControllerError {
    /// Requeue delay requested by the error itself, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ConnectivityTestFailed { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
