//! Main controller implementation.
//!
//! Wires the stores, node client and event publishers into a
//! [`Reconciler`], serves the probe endpoint, and runs the Machine and
//! Cluster watchers once this replica leads.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::events::{CLUSTER_CONTROLLER, KubeEventPublisher, MACHINE_CONTROLLER};
use crate::health;
use crate::leader::LeaderElector;
use crate::metrics::OperatorMetrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::watcher::Watcher;
use crds::{Cluster, Machine};
use kube::{Api, Client};
use resource_store::KubeStore;
use std::sync::Arc;
use std::time::Duration;
use talos_client::TalosctlFactory;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Bound on one-shot talosctl commands.
const TALOSCTL_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Main controller for Talos node lifecycle.
pub struct Controller {
    watcher: Arc<Watcher>,
    elector: Option<LeaderElector>,
    health_server: JoinHandle<Result<(), ControllerError>>,
    shutdown: watch::Sender<bool>,
}

impl Controller {
    /// Creates the controller and starts the probe endpoint.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing Talos operator");

        let client = Client::try_default().await?;

        let (machine_api, cluster_api): (Api<Machine>, Api<Cluster>) = match config.watch_namespace.as_deref() {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client.clone(), ns)),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };

        let metrics = OperatorMetrics::new()?;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::<Machine>::new(client.clone())),
            Arc::new(KubeStore::<Cluster>::new(client.clone())),
            Arc::new(TalosctlFactory::new(
                config.talosctl.clone(),
                config.talos_config_path.clone(),
                TALOSCTL_COMMAND_TIMEOUT,
            )),
            Arc::new(KubeEventPublisher::new(client.clone(), MACHINE_CONTROLLER)),
            Arc::new(KubeEventPublisher::new(client.clone(), CLUSTER_CONTROLLER)),
            ReconcilerSettings {
                default_port: config.default_port,
                probe_timeout: config.probe_timeout,
                retry_after: config.retry_after,
                health_check_timeout: config.health_check_timeout,
            },
            metrics.clone(),
        ));

        let listener = TcpListener::bind(config.probe_addr).await?;
        info!("Serving probes and metrics on {}", config.probe_addr);
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let health_server = tokio::spawn(async move {
            health::serve(listener, metrics, async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
            .map_err(ControllerError::from)
        });

        let elector = if config.leader_elect {
            Some(LeaderElector::new(
                client,
                &config.leader_election_namespace,
                &config.leader_election_id,
                &config.identity,
            ))
        } else {
            warn!("Leader election disabled, the operator must run as a single replica");
            None
        };

        info!("Talos operator initialized");

        Ok(Self {
            watcher: Arc::new(Watcher::new(reconciler, machine_api, cluster_api)),
            elector,
            health_server,
            shutdown,
        })
    }

    /// Runs until a watcher stops, leadership is lost, or ctrl-c is received.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self {
            watcher,
            elector,
            health_server,
            shutdown,
        } = self;

        if let Some(elector) = &elector {
            tokio::select! {
                () = elector.acquire() => {}
                signal = tokio::signal::ctrl_c() => {
                    log_signal(signal);
                    stop_health_server(shutdown, health_server).await;
                    return Ok(());
                }
            }
        }

        info!("Talos operator running");
        let mut machine_watcher = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.watch_machines().await })
        };
        let mut cluster_watcher = tokio::spawn(async move { watcher.watch_clusters().await });

        let result = tokio::select! {
            result = &mut machine_watcher => {
                result.unwrap_or_else(|e| Err(ControllerError::Watch(format!("Machine watcher panicked: {}", e))))
            }
            result = &mut cluster_watcher => {
                result.unwrap_or_else(|e| Err(ControllerError::Watch(format!("Cluster watcher panicked: {}", e))))
            }
            lost = hold_leadership(elector.as_ref()) => Err(lost),
            signal = tokio::signal::ctrl_c() => {
                log_signal(signal);
                if let Some(elector) = &elector
                    && let Err(e) = elector.release().await
                {
                    warn!("Failed to release leader lease: {}", e);
                }
                Ok(())
            }
        };

        machine_watcher.abort();
        cluster_watcher.abort();
        stop_health_server(shutdown, health_server).await;

        result
    }
}

/// Resolves when leadership is lost; never when election is disabled.
async fn hold_leadership(elector: Option<&LeaderElector>) -> ControllerError {
    match elector {
        Some(elector) => elector.hold().await,
        None => std::future::pending().await,
    }
}

fn log_signal(signal: std::io::Result<()>) {
    match signal {
        Ok(()) => info!("Received ctrl-c, shutting down"),
        Err(e) => error!("Failed to listen for ctrl-c: {}", e),
    }
}

async fn stop_health_server(shutdown: watch::Sender<bool>, health_server: JoinHandle<Result<(), ControllerError>>) {
    let _ = shutdown.send(true);
    match health_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Probe server failed: {}", e),
        Err(e) => error!("Probe server panicked: {}", e),
    }
}
