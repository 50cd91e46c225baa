//! Kubernetes API backed store.

use crate::error::StoreError;
use crate::store::ResourceStore;
use async_trait::async_trait;
use crds::LabelQuery;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// [`ResourceStore`] talking to the Kubernetes API server.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Creates a store for kind `K` using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").field("kind", &std::any::type_name::<K>()).finish()
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn list(&self, namespace: Option<&str>, query: Option<&LabelQuery>) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = match query {
            Some(query) => ListParams::default().labels_from(query.selector()),
            None => ListParams::default(),
        };
        debug!("Listing {} in {} ({:?})", K::kind(&()), namespace.unwrap_or("all namespaces"), params.label_selector);
        Ok(api.list(&params).await?.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn update_status(&self, object: &K) -> Result<K, StoreError> {
        let name = object.meta().name.clone().ok_or_else(|| StoreError::Invalid(format!("{} has no name", K::kind(&()))))?;
        let namespace = object.namespace().ok_or_else(|| StoreError::Invalid(format!("{} {} has no namespace", K::kind(&()), name)))?;

        let mut value = serde_json::to_value(object)?;
        let status = value.get_mut("status").map(serde_json::Value::take).unwrap_or_default();
        let patch = json!({ "status": status });

        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?)
    }
}
