//! Kubernetes Event recording for the Machine and Cluster controllers.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails a
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Reporting component of Machine events.
pub const MACHINE_CONTROLLER: &str = "talos-machine-controller";

/// Reporting component of Cluster events.
pub const CLUSTER_CONTROLLER: &str = "talos-cluster-controller";

/// Publishes Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an Event about `resource_ref`.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Creates a publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// TCP connection to the Machine endpoint succeeded
    pub const CONNECTIVITY_TEST_SUCCEEDED: &str = "ConnectivityTestSucceeded";
    /// TCP connection to the Machine endpoint failed
    pub const CONNECTIVITY_TEST_FAILED: &str = "ConnectivityTestFailed";
    /// Every readiness check passed
    pub const READY: &str = "Ready";
    /// At least one readiness check failed
    pub const CHECKS_FAILED: &str = "ChecksFailed";
    /// Machine became or stayed unready
    pub const UNREADY: &str = "Unready";
    /// Cluster health check failed
    pub const HEALTH_CHECK_FAILED: &str = "HealthCheckFailed";
}

/// Event actions.
pub mod actions {
    /// Machine connectivity test
    pub const PROBE: &str = "Probe";
    /// Readiness evaluation
    pub const EVALUATE: &str = "Evaluate";
    /// Cluster health check
    pub const HEALTH_CHECK: &str = "HealthCheck";
}

#[cfg(test)]
pub use recording::RecordingEventPublisher;

#[cfg(test)]
mod recording {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    /// A captured event.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedEvent {
        pub object: Option<String>,
        pub type_: EventType,
        pub reason: String,
        pub action: String,
        pub note: Option<String>,
    }

    /// Keeps every published event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingEventPublisher {
        events: Mutex<Vec<RecordedEvent>>,
    }

    impl RecordingEventPublisher {
        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn reasons(&self) -> Vec<String> {
            self.events().into_iter().map(|e| e.reason).collect()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingEventPublisher {
        async fn publish(
            &self,
            resource_ref: &ObjectReference,
            type_: EventType,
            reason: &str,
            action: &str,
            note: Option<String>,
        ) {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).push(RecordedEvent {
                object: resource_ref.name.clone(),
                type_,
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
        }
    }
}
