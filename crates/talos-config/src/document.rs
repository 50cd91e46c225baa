//! Editable machine configuration document.
//!
//! A [`MachineConfig`] is an untyped YAML mapping. Fields are addressed with
//! dotted paths such as `cluster.controlPlane.endpoint`.

use crate::error::{ConfigError, kind_of};
use serde_yaml::{Mapping, Value};

/// Talos machine configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineConfig {
    root: Mapping,
}

impl MachineConfig {
    /// Parses a YAML document. Empty or `null` input yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid YAML or a non-mapping top level.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_value(serde_yaml::from_str(document)?)
    }

    /// Wraps an already parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAMapping`] unless `value` is a mapping or null.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(ConfigError::NotAMapping(kind_of(&other))),
        }
    }

    /// True when the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The document as a YAML value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Mapping(self.root.clone())
    }

    /// Looks up a field by dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = current.as_mapping()?.get(segment)?;
        }
        Some(current)
    }

    /// Looks up a string field by dotted path.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Sets a field, creating intermediate mappings and replacing any
    /// non-mapping value found on the way.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(leaf) = segments.pop() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in segments {
            let entry = current
                .entry(Value::from(segment))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert(Value::from(leaf), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop()?;

        let mut current = &mut self.root;
        for segment in segments {
            current = current.get_mut(segment)?.as_mapping_mut()?;
        }
        current.remove(leaf)
    }

    /// Overlays `patch` onto this document.
    ///
    /// Mappings merge key by key, recursively. Any other patch value replaces
    /// the existing one outright, sequences included. A `null` in the patch
    /// deletes the key.
    pub fn overlay(&mut self, patch: &MachineConfig) {
        merge_mapping(&mut self.root, &patch.root);
    }

    /// Hostname assigned to the machine.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.get_str("machine.network.hostname")
    }

    /// Sets `machine.network.hostname`.
    pub fn set_hostname(&mut self, hostname: &str) {
        self.set("machine.network.hostname", hostname);
    }

    /// Replaces the addresses of the first entry of
    /// `machine.network.interfaces` with `[address]`.
    ///
    /// Returns `false`, leaving the document untouched, when no interface is
    /// declared.
    pub fn set_primary_interface_address(&mut self, address: &str) -> bool {
        let Some(first) = self
            .root
            .get_mut("machine")
            .and_then(|m| m.get_mut("network"))
            .and_then(|n| n.get_mut("interfaces"))
            .and_then(Value::as_sequence_mut)
            .and_then(|interfaces| interfaces.first_mut())
            .and_then(Value::as_mapping_mut)
        else {
            return false;
        };

        first.insert(
            Value::from("addresses"),
            Value::Sequence(vec![Value::from(address)]),
        );
        true
    }

    /// Addresses of the first declared interface.
    #[must_use]
    pub fn primary_interface_addresses(&self) -> Vec<&str> {
        self.get("machine.network.interfaces")
            .and_then(Value::as_sequence)
            .and_then(|interfaces| interfaces.first())
            .and_then(|first| first.get("addresses"))
            .and_then(Value::as_sequence)
            .map(|addresses| addresses.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Renders the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Renders the document as YAML bytes, ready to serve.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(self.to_yaml()?.into_bytes())
    }
}

fn merge_mapping(base: &mut Mapping, patch: &Mapping) {
    for (key, patch_value) in patch {
        if patch_value.is_null() {
            base.remove(key);
            continue;
        }
        if let (Some(Value::Mapping(base_child)), Value::Mapping(patch_child)) = (base.get_mut(key), patch_value) {
            merge_mapping(base_child, patch_child);
            continue;
        }
        base.insert(key.clone(), patch_value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_parses() {
        assert!(MachineConfig::from_yaml("").unwrap().is_empty());
        assert!(MachineConfig::from_yaml("  \n").unwrap().is_empty());
        assert!(MachineConfig::from_yaml("~").unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_is_rejected() {
        let err = MachineConfig::from_yaml("- a\n- b\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping("a sequence")));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(matches!(MachineConfig::from_yaml("machine: [unclosed"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_set_get_remove_paths() {
        let mut config = MachineConfig::default();
        config.set("cluster.controlPlane.endpoint", "https://10.0.0.1:6443");
        config.set("machine.type", "worker");

        assert_eq!(config.get_str("cluster.controlPlane.endpoint"), Some("https://10.0.0.1:6443"));
        assert_eq!(config.remove("machine.type"), Some(Value::from("worker")));
        assert!(config.get("machine.type").is_none());
        assert!(config.remove("machine.ca.crt").is_none());
    }

    #[test]
    fn test_set_replaces_scalar_on_path() {
        let mut config = MachineConfig::from_yaml("machine: worker\n").unwrap();
        config.set("machine.type", "worker");
        assert_eq!(config.get_str("machine.type"), Some("worker"));
    }

    #[test]
    fn test_overlay_deep_merges_mappings() {
        let mut base = MachineConfig::from_yaml(
            "machine:\n  type: worker\n  install:\n    disk: /dev/sda\n    wipe: false\n  certSANs: [a, b]\n",
        )
        .unwrap();
        let patch = MachineConfig::from_yaml(
            "machine:\n  install:\n    disk: /dev/nvme0n1\n  certSANs: [c]\n  sysctls:\n    vm.max_map_count: \"262144\"\n",
        )
        .unwrap();

        base.overlay(&patch);

        assert_eq!(base.get_str("machine.type"), Some("worker"));
        assert_eq!(base.get_str("machine.install.disk"), Some("/dev/nvme0n1"));
        assert_eq!(base.get("machine.install.wipe"), Some(&Value::Bool(false)));
        assert_eq!(
            base.get("machine.certSANs"),
            Some(&Value::Sequence(vec![Value::from("c")])),
            "sequences are replaced, not appended"
        );
        assert!(base.get("machine.sysctls").is_some());
    }

    #[test]
    fn test_overlay_null_removes_key() {
        let mut base = MachineConfig::from_yaml("machine:\n  install:\n    disk: /dev/sda\n").unwrap();
        let patch = MachineConfig::from_yaml("machine:\n  install: null\n").unwrap();

        base.overlay(&patch);
        assert!(base.get("machine.install").is_none());
    }

    #[test]
    fn test_primary_interface_requires_interface() {
        let mut config = MachineConfig::from_yaml("machine:\n  network: {}\n").unwrap();
        assert!(!config.set_primary_interface_address("10.0.0.5/24"));

        let mut config = MachineConfig::from_yaml(
            "machine:\n  network:\n    interfaces:\n      - interface: eth0\n        dhcp: false\n        addresses: [192.168.0.9/24]\n      - interface: eth1\n",
        )
        .unwrap();
        assert!(config.set_primary_interface_address("10.0.0.5/24"));
        assert_eq!(config.primary_interface_addresses(), vec!["10.0.0.5/24"]);
    }

    #[test]
    fn test_hostname_round_trip_through_bytes() {
        let mut config = MachineConfig::from_yaml("version: v1alpha1\n").unwrap();
        config.set_hostname("nucas-node-0a0b0c0d");

        let reparsed = MachineConfig::from_yaml(&String::from_utf8(config.to_bytes().unwrap()).unwrap()).unwrap();
        assert_eq!(reparsed.hostname(), Some("nucas-node-0a0b0c0d"));
    }
}
