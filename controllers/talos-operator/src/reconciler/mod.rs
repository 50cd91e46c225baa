//! Reconciliation logic for the Talos CRDs.
//!
//! - `machine`: connectivity and readiness conditions of a Machine
//! - `cluster`: health check across the Machines selected by a Cluster

pub mod cluster;
pub mod machine;


use crate::backoff::BackoffState;
use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::metrics::OperatorMetrics;
use crds::{Cluster, Machine};
use resource_store::ResourceStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use talos_client::NodeClientFactory;
use tracing::debug;

/// Timeouts and defaults used by the reconcilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Port probed when a Machine declares none
    pub default_port: u16,
    /// Bound on one TCP connectivity test
    pub probe_timeout: Duration,
    /// Requeue delay after a failed connectivity test
    pub retry_after: Duration,
    /// Bound on one cluster health check
    pub health_check_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            default_port: crds::DEFAULT_MACHINE_PORT,
            probe_timeout: Duration::from_secs(5),
            retry_after: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(60),
        }
    }
}

/// Reconciles Machines and Clusters.
pub struct Reconciler {
    pub(crate) machines: Arc<dyn ResourceStore<Machine>>,
    pub(crate) clusters: Arc<dyn ResourceStore<Cluster>>,
    pub(crate) nodes: Arc<dyn NodeClientFactory>,
    pub(crate) machine_events: Arc<dyn EventPublisher>,
    pub(crate) cluster_events: Arc<dyn EventPublisher>,
    pub(crate) settings: ReconcilerSettings,
    pub(crate) metrics: OperatorMetrics,
    /// Error count tracking per resource (kind/namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a reconciler over the given stores and node client.
    pub fn new(
        machines: Arc<dyn ResourceStore<Machine>>,
        clusters: Arc<dyn ResourceStore<Cluster>>,
        nodes: Arc<dyn NodeClientFactory>,
        machine_events: Arc<dyn EventPublisher>,
        cluster_events: Arc<dyn EventPublisher>,
        settings: ReconcilerSettings,
        metrics: OperatorMetrics,
    ) -> Self {
        Self {
            machines,
            clusters,
            nodes,
            machine_events,
            cluster_events,
            settings,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn backoff_states(&self) -> MutexGuard<'_, HashMap<String, BackoffState>> {
        self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay before retrying `key` after `error`.
    ///
    /// Errors carrying their own retry delay use it unchanged; any other
    /// error advances the resource's Fibonacci backoff.
    pub fn error_delay(&self, key: &str, error: &ControllerError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after;
        }
        let mut states = self.backoff_states();
        let state = states.entry(key.to_string()).or_default();
        let delay = state.record_error();
        debug!("{} failed {} time(s), retrying in {:?}", key, state.error_count(), delay);
        delay
    }

    /// Forgets the failure history of `key` after a successful pass.
    pub fn reset_error(&self, key: &str) {
        let mut states = self.backoff_states();
        if let Some(state) = states.get_mut(key)
            && state.error_count() > 0
        {
            debug!("Reset backoff for {} after {} failure(s)", key, state.error_count());
            state.reset();
        }
    }

    /// Current consecutive failure count of `key`.
    #[cfg(test)]
    pub fn error_count(&self, key: &str) -> u32 {
        self.backoff_states().get(key).map_or(0, BackoffState::error_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;

    #[test]
    fn test_connectivity_errors_use_their_own_delay() {
        let harness = TestHarness::new();
        let error = ControllerError::ConnectivityTestFailed {
            endpoint: "10.0.0.1:6443".to_string(),
            message: "connection refused".to_string(),
            retry_after: Duration::from_secs(5),
        };

        assert_eq!(harness.reconciler.error_delay("Machine/m/a", &error), Duration::from_secs(5));
        assert_eq!(harness.reconciler.error_delay("Machine/m/a", &error), Duration::from_secs(5));
        assert_eq!(harness.reconciler.error_count("Machine/m/a"), 0, "Fixed retries do not count");
    }

    #[test]
    fn test_other_errors_back_off_until_reset() {
        let harness = TestHarness::new();
        let error = ControllerError::HealthCheck("timeout".to_string());

        assert_eq!(harness.reconciler.error_delay("Cluster/c/a", &error), Duration::from_secs(60));
        assert_eq!(harness.reconciler.error_delay("Cluster/c/a", &error), Duration::from_secs(60));
        assert_eq!(harness.reconciler.error_delay("Cluster/c/a", &error), Duration::from_secs(120));
        assert_eq!(harness.reconciler.error_count("Cluster/c/a"), 3);

        harness.reconciler.reset_error("Cluster/c/a");

        assert_eq!(harness.reconciler.error_count("Cluster/c/a"), 0);
        assert_eq!(harness.reconciler.error_delay("Cluster/c/a", &error), Duration::from_secs(60));
    }
}
