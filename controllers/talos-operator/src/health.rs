//! Liveness, readiness and metrics endpoint.

use crate::metrics::OperatorMetrics;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::error;

/// Routes served on the probe address.
pub fn router(metrics: OperatorMetrics) -> Router {
    Router::new()
        .route("/healthz", get(ok))
        .route("/readyz", get(ok))
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn ok() -> &'static str {
    "ok"
}

async fn render_metrics(State(metrics): State<OperatorMetrics>) -> Response {
    match metrics.render() {
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

/// Serves the probe endpoints until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, metrics: OperatorMetrics, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
}
