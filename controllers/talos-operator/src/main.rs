//! Talos Operator
//!
//! Controller for the Talos node lifecycle CRDs:
//! - Machine: probes the node's API endpoint and records Available/Ready
//! - Cluster: runs a Talos health check across the selected Machines

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod health;
mod leader;
mod metrics;
mod probe;
mod reconciler;
mod test_utils;
mod watcher;

use crate::config::OperatorConfig;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Talos Operator");

    let config = OperatorConfig::from_env()?;
    info!("Configuration: {}", config);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
