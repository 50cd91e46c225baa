//! Mock node clients for unit testing
//!
//! Resources and health-check scripts are configured up front; every
//! session opened by [`MockNodeClientFactory`] shares the same state and the
//! factory records the endpoint sets it was asked to connect to.

use crate::client::{HealthStream, NodeClient, NodeClientFactory};
use crate::error::TalosError;
use crate::models::{
    ClusterInfo, HealthMessage, ResourceDefinition, ResourceMetadata, ResourceSnapshot, select_definition,
};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One scripted health-check step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStep {
    /// Emit a progress message
    Message(String),
    /// Fail the stream with this message
    Fail(String),
    /// Never produce another item
    Hang,
}

#[derive(Debug, Default)]
struct MockState {
    definitions: Vec<ResourceDefinition>,
    resources: HashMap<ResourceMetadata, serde_yaml::Value>,
    health_script: Vec<HealthStep>,
    connect_error: Option<String>,
    connections: Vec<Vec<String>>,
    health_checks: Vec<Duration>,
}

/// Mock factory for testing
#[derive(Debug, Clone, Default)]
pub struct MockNodeClientFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockNodeClientFactory {
    /// Create a new mock factory with no resources
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a resource definition (for test setup)
    pub fn add_definition(&self, definition: ResourceDefinition) {
        self.state().definitions.push(definition);
    }

    /// Register a resource with the given spec (for test setup)
    pub fn add_resource(&self, metadata: ResourceMetadata, spec: serde_yaml::Value) {
        self.state().resources.insert(metadata, spec);
    }

    /// Registers the machine config resource kind and stores `document` as
    /// its `v1alpha1` value.
    pub fn with_machine_config(self, document: &str) -> Self {
        let definition = ResourceDefinition {
            type_: "MachineConfigs.config.talos.dev".to_string(),
            aliases: vec!["machineconfig".to_string(), "mc".to_string()],
            default_namespace: "config".to_string(),
        };
        let metadata = definition.metadata("config", "v1alpha1");
        self.add_definition(definition);
        self.add_resource(metadata, serde_yaml::Value::String(document.to_string()));
        self
    }

    /// Script the health-check stream
    pub fn set_health_script(&self, steps: Vec<HealthStep>) {
        self.state().health_script = steps;
    }

    /// Make `connect` fail
    pub fn set_connect_error(&self, message: impl Into<String>) {
        self.state().connect_error = Some(message.into());
    }

    /// Endpoint sets passed to `connect`, in call order
    #[must_use]
    pub fn connections(&self) -> Vec<Vec<String>> {
        self.state().connections.clone()
    }

    /// Timeouts passed to `health_check`, in call order
    #[must_use]
    pub fn health_checks(&self) -> Vec<Duration> {
        self.state().health_checks.clone()
    }
}

#[async_trait]
impl NodeClientFactory for MockNodeClientFactory {
    async fn connect(&self, endpoints: &[String]) -> Result<Box<dyn NodeClient>, TalosError> {
        let mut state = self.state();
        state.connections.push(endpoints.to_vec());
        if let Some(message) = &state.connect_error {
            return Err(TalosError::Connect {
                endpoints: endpoints.to_vec(),
                message: message.clone(),
            });
        }
        Ok(Box::new(MockNodeClient {
            factory: self.clone(),
        }))
    }
}

/// Mock session handed out by [`MockNodeClientFactory`]
#[derive(Debug, Clone)]
pub struct MockNodeClient {
    factory: MockNodeClientFactory,
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn resolve_resource_kind(&self, namespace: Option<&str>, name: &str) -> Result<ResourceDefinition, TalosError> {
        let definitions = self.factory.state().definitions.clone();
        select_definition(definitions, namespace, name).ok_or_else(|| TalosError::UnknownResourceKind(name.to_string()))
    }

    async fn get(&self, metadata: &ResourceMetadata) -> Result<ResourceSnapshot, TalosError> {
        let spec = self
            .factory
            .state()
            .resources
            .get(metadata)
            .cloned()
            .ok_or_else(|| TalosError::NotFound(format!("{}/{}/{}", metadata.namespace, metadata.type_, metadata.id)))?;
        Ok(ResourceSnapshot {
            metadata: metadata.clone(),
            spec,
        })
    }

    async fn health_check(&self, timeout: Duration, _info: &ClusterInfo) -> Result<HealthStream, TalosError> {
        let script = {
            let mut state = self.factory.state();
            state.health_checks.push(timeout);
            state.health_script.clone()
        };

        let hangs = script.contains(&HealthStep::Hang);
        let items: Vec<Result<HealthMessage, TalosError>> = script
            .into_iter()
            .map_while(|step| match step {
                HealthStep::Message(message) => Some(Ok(HealthMessage::from_line(&message))),
                HealthStep::Fail(message) => Some(Err(TalosError::HealthCheck(message))),
                HealthStep::Hang => None,
            })
            .collect();

        let scripted = stream::iter(items);
        if hangs {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }
}
