//! Server error types.

use crate::allocator::AllocationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use resource_store::StoreError;
use talos_client::TalosError;
use talos_config::ConfigError;
use thiserror::Error;
use tracing::error;

/// Startup and serving errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An environment setting could not be parsed
    #[error("invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
        /// Parse failure
        reason: String,
    },

    /// Metrics registry setup failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Binding or serving failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a provisioning request. Each variant maps to one HTTP status
/// and a short client-facing message; the full error is only logged.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Patch ConfigMap does not exist
    #[error("machine patch {namespace}/{name} not found")]
    PatchNotFound {
        /// ConfigMap namespace
        namespace: String,
        /// ConfigMap name
        name: String,
    },

    /// Patch ConfigMap could not be read
    #[error("failed to read machine patch: {0}")]
    PatchRead(#[source] StoreError),

    /// Patch document is malformed
    #[error("failed to parse machine patch: {0}")]
    InvalidPatch(#[source] ConfigError),

    /// No session to the reference node
    #[error("failed to connect to talos: {0}")]
    TalosConnect(#[source] TalosError),

    /// Machine config resource kind unknown to the node
    #[error("failed to resolve machine config kind: {0}")]
    ResolveKind(#[source] TalosError),

    /// Live machine config could not be read
    #[error("failed to read live machine config: {0}")]
    LiveConfig(#[source] TalosError),

    /// Live machine config is malformed
    #[error("failed to parse live machine config: {0}")]
    InvalidLiveConfig(#[source] ConfigError),

    /// Baseline generation failed
    #[error("failed to generate baseline config: {0}")]
    Generate(#[source] ConfigError),

    /// Existing Machines could not be listed
    #[error("failed to list machines: {0}")]
    ListMachines(#[source] StoreError),

    /// No free address in the machine CIDR
    #[error(transparent)]
    AddressesExhausted(AllocationError),

    /// Name uniqueness could not be checked
    #[error("failed to check machine name: {0}")]
    NameLookup(#[source] StoreError),

    /// Every generated name collided
    #[error("no unique machine name after {0} attempts")]
    NamesExhausted(usize),

    /// Merged config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] ConfigError),

    /// Machine record could not be created
    #[error("failed to create machine: {0}")]
    CreateMachine(#[source] StoreError),
}

impl ProvisionError {
    /// HTTP status reported to the client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PatchNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidPatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AddressesExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message reported to the client.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::PatchNotFound { .. } | Self::PatchRead(_) => "could not get machine patch",
            Self::InvalidPatch(_) => "could not unmarshal machine patch",
            Self::TalosConnect(_) => "could not initialise talos client",
            Self::ResolveKind(_) => "could not get talos machine config kind",
            Self::LiveConfig(_) => "could not get talos machine config spec",
            Self::InvalidLiveConfig(_) => "could not unmarshal talos machine config spec",
            Self::Generate(_) => "failed to generate config",
            Self::ListMachines(_) => "failed to list machines",
            Self::AddressesExhausted(_) => "no more IPs available in CIDR",
            Self::NameLookup(_) | Self::NamesExhausted(_) => "failed to generate machine name",
            Self::Serialize(_) => "failed to serialize config",
            Self::CreateMachine(_) => "failed to create machine",
        }
    }

    /// Label used for the request outcome metric.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::PatchNotFound { .. } | Self::PatchRead(_) | Self::InvalidPatch(_) => "patch_error",
            Self::TalosConnect(_) | Self::ResolveKind(_) | Self::LiveConfig(_) | Self::InvalidLiveConfig(_) => {
                "live_config_error"
            }
            Self::AddressesExhausted(_) => "exhausted",
            _ => "error",
        }
    }
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        error!(error = %self, "{}", self.message());
        (self.status(), self.message()).into_response()
    }
}
