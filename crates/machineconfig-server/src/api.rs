//! HTTP handlers.

use crate::metrics::Metrics;
use crate::provision::{ProvisionRequest, Provisioner};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request handler
    pub provisioner: Arc<Provisioner>,
    /// Counters
    pub metrics: Metrics,
}

/// Identity a booting node sends as query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeIdentity {
    /// SMBIOS UUID
    pub uuid: Option<String>,
    /// Serial number
    pub serial: Option<String>,
    /// MAC address
    pub mac: Option<String>,
    /// Hostname
    pub hostname: Option<String>,
}

impl NodeIdentity {
    fn into_request(self, config_name: Option<String>) -> ProvisionRequest {
        ProvisionRequest {
            uuid: self.uuid,
            serial: self.serial,
            mac: self.mac,
            hostname: self.hostname,
            config_name,
        }
    }
}

/// `GET /machineconfig/new`
pub async fn new_machine_config(State(state): State<AppState>, Query(identity): Query<NodeIdentity>) -> Response {
    provision(&state, identity.into_request(None)).await
}

/// `GET /machineconfig/new/{config_name}`
pub async fn new_named_machine_config(
    State(state): State<AppState>,
    Path(config_name): Path<String>,
    Query(identity): Query<NodeIdentity>,
) -> Response {
    provision(&state, identity.into_request(Some(config_name))).await
}

async fn provision(state: &AppState, request: ProvisionRequest) -> Response {
    match state.provisioner.provision(&request).await {
        Ok(provisioned) => {
            state.metrics.observe_request("success");
            state.metrics.observe_registration();
            ([(CONTENT_TYPE, "application/yaml")], provisioned.document).into_response()
        }
        Err(e) => {
            state.metrics.observe_request(e.outcome());
            e.into_response()
        }
    }
}

/// `GET /livez`
pub async fn livez() -> &'static str {
    "ok"
}

/// `GET /readyz`
pub async fn readyz() -> &'static str {
    "ok"
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
