//! Kubernetes resource watchers.
//!
//! Both watchers use the generic `watch_resource()` helper built on
//! `kube_runtime::Controller`, which reconnects and requeues on its own.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{Cluster, Machine};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Debounce of the Machine controller.
///
/// kube-runtime adds the debounce to every scheduled run, requeues included,
/// so it stays zero to keep the connectivity retry at `retry_after`.
pub const MACHINE_DEBOUNCE: Duration = Duration::ZERO;

/// Debounce of the Cluster controller; batches bursts of Cluster events.
pub const CLUSTER_DEBOUNCE: Duration = Duration::from_secs(5);

/// Parallel reconciliations per controller.
const CONCURRENCY: u16 = 3;

/// Boxed future returned by a reconcile function.
pub type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

/// Backoff key of a resource.
fn resource_key<K: kube::Resource>(kind: &str, obj: &K) -> String {
    format!("{}/{}/{}", kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

fn controller_config(debounce: Duration) -> ControllerConfig {
    ControllerConfig::default().debounce(debounce).concurrency(CONCURRENCY)
}

/// Runs a `kube_runtime::Controller` for `K` until its stream ends.
///
/// Successful passes reset the resource's backoff. Failed passes are
/// requeued after [`Reconciler::error_delay`].
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    kind: &'static str,
    debounce: Duration,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", kind);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = resource_key(kind, obj.as_ref());
        let delay = ctx.error_delay(&key, error);
        warn!("Reconciliation of {} failed, requeue in {:?}: {}", key, delay, error);
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = resource_key(kind, obj.as_ref());
            debug!("Reconciling {}", key);

            let result = reconcile_fn(Arc::clone(&ctx), obj).await;
            ctx.metrics.observe(kind, result.is_ok());
            if result.is_ok() {
                ctx.reset_error(&key);
            }
            result
        }
    };

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config(debounce))
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", kind, e);
            }
        })
        .await;

    Ok(())
}

/// Watches Machines and Clusters.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    machine_api: Api<Machine>,
    cluster_api: Api<Cluster>,
}

impl Watcher {
    /// Creates a watcher over the given APIs.
    pub fn new(reconciler: Arc<Reconciler>, machine_api: Api<Machine>, cluster_api: Api<Cluster>) -> Self {
        Self {
            reconciler,
            machine_api,
            cluster_api,
        }
    }

    /// Reconciles Machines on every change.
    pub async fn watch_machines(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.machine_api.clone(),
            Arc::clone(&self.reconciler),
            |reconciler: Arc<Reconciler>, machine: Arc<Machine>| -> ReconcileFuture {
                Box::pin(async move {
                    let namespace = machine.namespace().unwrap_or_default();
                    reconciler.reconcile_machine(&namespace, &machine.name_any()).await
                })
            },
            "Machine",
            MACHINE_DEBOUNCE,
        )
        .await
    }

    /// Reconciles Clusters on every change.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.cluster_api.clone(),
            Arc::clone(&self.reconciler),
            |reconciler: Arc<Reconciler>, cluster: Arc<Cluster>| -> ReconcileFuture {
                Box::pin(async move {
                    let namespace = cluster.namespace().unwrap_or_default();
                    reconciler.reconcile_cluster(&namespace, &cluster.name_any()).await
                })
            },
            "Cluster",
            CLUSTER_DEBOUNCE,
        )
        .await
    }
}
