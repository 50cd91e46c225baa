//! Talos client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to Talos nodes
#[derive(Debug, Error)]
pub enum TalosError {
    /// Client configuration (talosconfig) missing or unusable
    #[error("Talos client configuration error: {0}")]
    Config(String),

    /// Could not establish a session with the given endpoints
    #[error("Failed to connect to {endpoints:?}: {message}")]
    Connect {
        /// Endpoints that were dialed
        endpoints: Vec<String>,
        /// Underlying failure
        message: String,
    },

    /// Spawning or talking to the talosctl process failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// talosctl exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        /// Rendered command line
        command: String,
        /// Exit status
        status: String,
        /// Trimmed standard error
        stderr: String,
    },

    /// Operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Resource does not exist on the node
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// No resource definition matches the requested kind
    #[error("Unknown resource kind: {0}")]
    UnknownResourceKind(String),

    /// Output could not be decoded
    #[error("Failed to parse talosctl output: {0}")]
    Parse(String),

    /// Health check reported a failure
    #[error("Health check failed: {0}")]
    HealthCheck(String),
}

impl From<serde_json::Error> for TalosError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for TalosError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
