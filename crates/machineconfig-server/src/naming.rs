//! Machine name generation.

use crate::error::ProvisionError;
use crds::Machine;
use resource_store::{IgnoreNotFound, ResourceStore};
use tracing::warn;

/// Attempts made before giving up on finding an unused name.
pub const NAME_ATTEMPTS: usize = 5;

/// `prefix` followed by four random bytes, hex encoded.
#[must_use]
pub fn random_machine_name(prefix: &str) -> String {
    format!("{prefix}{}", hex::encode(rand::random::<[u8; 4]>()))
}

/// Generates a random name not yet used by a Machine in `namespace`.
///
/// # Errors
///
/// Fails when the store cannot be queried or every attempt collided.
pub async fn unique_machine_name(
    machines: &dyn ResourceStore<Machine>,
    namespace: &str,
    prefix: &str,
) -> Result<String, ProvisionError> {
    unique_name_with(machines, namespace, || random_machine_name(prefix)).await
}

pub(crate) async fn unique_name_with<F>(
    machines: &dyn ResourceStore<Machine>,
    namespace: &str,
    mut generate: F,
) -> Result<String, ProvisionError>
where
    F: FnMut() -> String + Send,
{
    for _ in 0..NAME_ATTEMPTS {
        let name = generate();
        let existing = machines
            .get(namespace, &name)
            .await
            .ignore_not_found()
            .map_err(ProvisionError::NameLookup)?;
        if existing.is_none() {
            return Ok(name);
        }
        warn!("Generated machine name {}/{} already in use, retrying", namespace, name);
    }
    Err(ProvisionError::NamesExhausted(NAME_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::MachineSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use resource_store::MemoryStore;

    fn machine(name: &str) -> Machine {
        Machine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("machines".to_string()),
                ..Default::default()
            },
            spec: MachineSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_random_name_shape() {
        let name = random_machine_name("nucas-node-");
        let suffix = name.strip_prefix("nucas-node-").unwrap();

        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_collision_is_retried() {
        let store = MemoryStore::new();
        store.insert(machine("node-a"));
        let mut candidates = vec!["node-b", "node-a"];

        let name = unique_name_with(&store, "machines", || candidates.pop().unwrap().to_string())
            .await
            .unwrap();

        assert_eq!(name, "node-b");
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let store = MemoryStore::new();
        store.insert(machine("node-a"));

        let result = unique_name_with(&store, "machines", || "node-a".to_string()).await;
        assert!(matches!(result, Err(ProvisionError::NamesExhausted(NAME_ATTEMPTS))));
    }
}
