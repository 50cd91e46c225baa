//! Machine config provisioning server
//!
//! Hands first-boot Talos nodes a merged machine config and registers them
//! as `Machine` resources.

use anyhow::Context;
use crds::Machine;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use machineconfig_server::{AppState, Metrics, Provisioner, ServerConfig, server};
use resource_store::KubeStore;
use std::sync::Arc;
use talos_client::TalosctlFactory;
use talos_config::TemplateGenerator;
use tokio::net::TcpListener;
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

    info!("Starting machine config server");

    let config = ServerConfig::from_env()?;
    info!("Configuration: {}", config);

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let nodes = TalosctlFactory::new(
        config.talosctl.clone(),
        config.talos_config_path.clone(),
        config.command_timeout,
    );
    let listen_addr = config.listen_addr();
    let provisioner = Provisioner::new(
        Arc::new(config),
        Arc::new(KubeStore::<Machine>::new(client.clone())),
        Arc::new(KubeStore::<ConfigMap>::new(client)),
        Arc::new(nodes),
        Arc::new(TemplateGenerator::default()),
    );
    let state = AppState {
        provisioner: Arc::new(provisioner),
        metrics: Metrics::new()?,
    };

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!("Listening on {}", listen_addr);

    server::serve(listener, state, shutdown_signal()).await?;

    info!("Machine config server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
