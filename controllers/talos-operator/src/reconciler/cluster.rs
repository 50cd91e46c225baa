//! Cluster reconciliation: health check across the selected Machines.

use super::Reconciler;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use futures::StreamExt;
use kube::Resource;
use kube::runtime::events::EventType;
use kube_runtime::controller::Action;
use resource_store::IgnoreNotFound;
use talos_client::ClusterInfo;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Runs a Talos health check against the Machines selected by
    /// `spec.nodes.selector`.
    ///
    /// Writes no status. A Cluster selecting no Machines is left alone.
    pub async fn reconcile_cluster(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let Some(cluster) = self.clusters.get(namespace, name).await.ignore_not_found()? else {
            debug!("Cluster {}/{} no longer exists", namespace, name);
            return Ok(Action::await_change());
        };

        let query = cluster
            .spec
            .nodes
            .selector
            .to_query()
            .map_err(|source| ControllerError::InvalidSelector {
                cluster: format!("{namespace}/{name}"),
                source,
            })?;

        let machines = self.machines.list(None, Some(&query)).await?;
        if machines.is_empty() {
            warn!("Cluster {}/{} selects no machines ({}), skipping health check", namespace, name, query);
            return Ok(Action::await_change());
        }

        let endpoints: Vec<String> = machines
            .iter()
            .map(|m| m.spec.endpoint(self.settings.default_port))
            .collect();
        info!("Checking health of cluster {}/{} via {}", namespace, name, endpoints.join(","));

        let timeout = self.settings.health_check_timeout;
        let result = match tokio::time::timeout(timeout, self.run_health_check(&endpoints)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ControllerError::HealthCheck(format!(
                "health check did not finish within {timeout:?}"
            ))),
        };

        if let Err(e) = &result {
            warn!("Cluster {}/{} is unhealthy: {}", namespace, name, e);
            self.cluster_events
                .publish(
                    &cluster.object_ref(&()),
                    EventType::Warning,
                    reasons::HEALTH_CHECK_FAILED,
                    actions::HEALTH_CHECK,
                    Some(e.to_string()),
                )
                .await;
        }
        result?;

        info!("Cluster {}/{} is healthy", namespace, name);
        Ok(Action::await_change())
    }

    async fn run_health_check(&self, endpoints: &[String]) -> Result<(), ControllerError> {
        let client = self.nodes.connect(endpoints).await?;
        let mut messages = client
            .health_check(self.settings.health_check_timeout, &ClusterInfo::default())
            .await?;

        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => info!("{}", message),
                Err(e) => return Err(ControllerError::HealthCheck(e.to_string())),
            }
        }
        Ok(())
    }
}
