//! In-memory store for unit testing
//!
//! Stores objects keyed by namespace and name, evaluates label queries
//! locally, and can be told to fail specific operations.

use crate::error::StoreError;
use crate::store::ResourceStore;
use async_trait::async_trait;
use crds::LabelQuery;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Objects<K> = BTreeMap<(String, String), K>;

/// Mock store for testing
#[derive(Debug)]
pub struct MemoryStore<K> {
    objects: Arc<Mutex<Objects<K>>>,
    fail_creates: Arc<AtomicBool>,
    fail_status_updates: Arc<AtomicBool>,
    creates: Arc<AtomicUsize>,
    status_updates: Arc<AtomicUsize>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
            fail_creates: Arc::clone(&self.fail_creates),
            fail_status_updates: Arc::clone(&self.fail_status_updates),
            creates: Arc::clone(&self.creates),
            status_updates: Arc::clone(&self.status_updates),
        }
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            fail_creates: Arc::new(AtomicBool::new(false)),
            fail_status_updates: Arc::new(AtomicBool::new(false)),
            creates: Arc::new(AtomicUsize::new(0)),
            status_updates: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, Objects<K>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an object directly (for test setup). The object must carry a
    /// namespace and a name.
    pub fn insert(&self, object: K) {
        let key = (object.namespace().unwrap_or_default(), object.name_any());
        self.objects().insert(key, object);
    }

    /// Returns a stored object without going through the trait.
    #[must_use]
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects().get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// All stored objects, ordered by namespace and name.
    #[must_use]
    pub fn all(&self) -> Vec<K> {
        self.objects().values().cloned().collect()
    }

    /// Makes subsequent `create` calls fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `update_status` calls fail.
    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `create` calls.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful `update_status` calls.
    #[must_use]
    pub fn status_update_count(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.snapshot(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))
    }

    async fn list(&self, namespace: Option<&str>, query: Option<&LabelQuery>) -> Result<Vec<K>, StoreError> {
        Ok(self
            .objects()
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|want| want == ns))
            .filter(|(_, obj)| query.is_none_or(|q| q.matches(obj.labels())))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Invalid("create rejected by test store".to_string()));
        }
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))?;

        let mut objects = self.objects();
        let key = (namespace.to_string(), name);
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{}/{}", key.0, key.1)));
        }

        let mut stored = object.clone();
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().generation.get_or_insert(1);
        objects.insert(key, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update_status(&self, object: &K) -> Result<K, StoreError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Invalid("status update rejected by test store".to_string()));
        }
        let key = (object.namespace().unwrap_or_default(), object.name_any());

        let mut objects = self.objects();
        let current = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", key.0, key.1)))?;

        let mut merged = serde_json::to_value(current)?;
        let status = serde_json::to_value(object)?.get("status").cloned().unwrap_or_default();
        merged["status"] = status;
        let updated: K = serde_json::from_value(merged)?;

        objects.insert(key, updated.clone());
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{Condition, ConditionStatus, Machine, MachineSelector, MachineSpec, MachineStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn machine(namespace: &str, name: &str, role: &str) -> Machine {
        Machine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some([("role".to_string(), role.to_string())].into()),
                ..Default::default()
            },
            spec: MachineSpec {
                address: "10.0.0.1".to_string(),
                port: None,
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace_and_query() {
        let store = MemoryStore::new();
        store.insert(machine("a", "cp-1", "control-plane"));
        store.insert(machine("b", "cp-2", "control-plane"));
        store.insert(machine("b", "w-1", "worker"));

        let query = MachineSelector::from_labels([("role", "control-plane")]).to_query().unwrap();

        let everywhere = store.list(None, Some(&query)).await.unwrap();
        let in_b = store.list(Some("b"), Some(&query)).await.unwrap();
        let all_b = store.list(Some("b"), None).await.unwrap();

        assert_eq!(everywhere.len(), 2);
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].name_any(), "cp-2");
        assert_eq!(all_b.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = MemoryStore::new();
        let m = machine("machines", "node-1", "worker");

        let created = store.create("machines", &m).await.unwrap();
        assert_eq!(created.metadata.generation, Some(1));

        let again = store.create("machines", &m).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_update_status_only_touches_status() {
        let store = MemoryStore::new();
        store.insert(machine("machines", "node-1", "worker"));

        let mut changed = machine("machines", "node-1", "worker");
        changed.spec.address = "10.9.9.9".to_string();
        changed.status = Some(MachineStatus {
            conditions: vec![Condition {
                type_: "Ready".to_string(),
                status: ConditionStatus::True,
                reason: "Ready".to_string(),
                message: String::new(),
                observed_generation: 1,
                last_transition_time: chrono::Utc::now(),
            }],
        });

        store.update_status(&changed).await.unwrap();
        let stored = store.snapshot("machines", "node-1").unwrap();

        assert_eq!(stored.spec.address, "10.0.0.1", "spec must not change through the status sub-resource");
        assert_eq!(stored.status.unwrap().conditions.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store: MemoryStore<Machine> = MemoryStore::new();
        let err = store.get("machines", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
