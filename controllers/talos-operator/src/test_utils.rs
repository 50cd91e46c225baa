//! Test utilities for unit testing reconcilers
//!
//! Builds a [`Reconciler`] over in-memory stores, a scripted node client and
//! recording event publishers.

#![cfg(test)]

use crate::events::RecordingEventPublisher;
use crate::metrics::OperatorMetrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crds::{Cluster, ClusterSpec, Machine, MachineSelector, MachineSet, MachineSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use resource_store::MemoryStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use talos_client::MockNodeClientFactory;

/// Reconciler plus handles on everything it talks to.
pub struct TestHarness {
    pub reconciler: Reconciler,
    pub machines: MemoryStore<Machine>,
    pub clusters: MemoryStore<Cluster>,
    pub nodes: MockNodeClientFactory,
    pub machine_events: Arc<RecordingEventPublisher>,
    pub cluster_events: Arc<RecordingEventPublisher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(ReconcilerSettings {
            probe_timeout: Duration::from_secs(1),
            health_check_timeout: Duration::from_secs(2),
            ..ReconcilerSettings::default()
        })
    }

    pub fn with_settings(settings: ReconcilerSettings) -> Self {
        let machines = MemoryStore::new();
        let clusters = MemoryStore::new();
        let nodes = MockNodeClientFactory::new();
        let machine_events = Arc::new(RecordingEventPublisher::default());
        let cluster_events = Arc::new(RecordingEventPublisher::default());

        let reconciler = Reconciler::new(
            Arc::new(machines.clone()),
            Arc::new(clusters.clone()),
            Arc::new(nodes.clone()),
            machine_events.clone(),
            cluster_events.clone(),
            settings,
            OperatorMetrics::new().unwrap(),
        );

        Self {
            reconciler,
            machines,
            clusters,
            nodes,
            machine_events,
            cluster_events,
        }
    }
}

/// Helper to create a test Machine
pub fn create_test_machine(name: &str, namespace: &str, address: &str, port: Option<u16>) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: MachineSpec {
            address: address.to_string(),
            port,
        },
        status: None,
    }
}

/// Helper to create a labeled test Machine
pub fn create_labeled_machine(name: &str, namespace: &str, address: &str, labels: &[(&str, &str)]) -> Machine {
    let mut machine = create_test_machine(name, namespace, address, None);
    machine.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    );
    machine
}

/// Helper to create a test Cluster selecting its nodes by labels
pub fn create_test_cluster(name: &str, namespace: &str, selector: &[(&str, &str)]) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: ClusterSpec {
            nodes: MachineSet {
                name: "control-plane".to_string(),
                selector: MachineSelector::from_labels(selector.iter().copied()),
                config: None,
            },
            worker_sets: Vec::new(),
        },
        status: None,
    }
}
