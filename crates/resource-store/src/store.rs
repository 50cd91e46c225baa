//! The object store seam.

use crate::error::StoreError;
use async_trait::async_trait;
use crds::LabelQuery;

/// Get/List/Create/Update-Status access to namespaced objects of kind `K`.
///
/// Implementations hold no lock across calls; each method is a single read
/// or a single write against the backing store.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetches one object.
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Lists objects in `namespace` (all namespaces when `None`), filtered by
    /// `query` when given.
    async fn list(&self, namespace: Option<&str>, query: Option<&LabelQuery>) -> Result<Vec<K>, StoreError>;

    /// Creates an object in `namespace`, returning the stored copy.
    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Writes the object's status through the status sub-resource.
    async fn update_status(&self, object: &K) -> Result<K, StoreError>;
}
