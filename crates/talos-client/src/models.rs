//! Talos resource models

use serde::{Deserialize, Serialize};

/// Resource kind as registered on the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Fully qualified resource type (e.g. `MachineConfigs.config.talos.dev`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Short names accepted for the type
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Namespace resources of this type live in by default
    #[serde(default)]
    pub default_namespace: String,
}

impl ResourceDefinition {
    /// True when `name` is the type or one of its aliases (case-insensitive).
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.type_.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Metadata addressing resource `id` of this kind in `namespace`.
    #[must_use]
    pub fn metadata(&self, namespace: &str, id: &str) -> ResourceMetadata {
        let namespace = if namespace.is_empty() { &self.default_namespace } else { namespace };
        ResourceMetadata {
            namespace: namespace.to_string(),
            type_: self.type_.clone(),
            id: id.to_string(),
        }
    }
}

/// Picks the definition `name` refers to.
///
/// Aliases are not unique across namespaces: when `namespace` is given, a
/// match whose default namespace equals it wins over earlier matches.
pub fn select_definition<I>(definitions: I, namespace: Option<&str>, name: &str) -> Option<ResourceDefinition>
where
    I: IntoIterator<Item = ResourceDefinition>,
{
    let mut first = None;
    for definition in definitions.into_iter().filter(|def| def.matches(name)) {
        if namespace.is_some_and(|ns| ns == definition.default_namespace) {
            return Some(definition);
        }
        first.get_or_insert(definition);
    }
    first
}

/// Address of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Resource namespace (e.g. `config`)
    pub namespace: String,

    /// Resource type
    #[serde(rename = "type")]
    pub type_: String,

    /// Resource id (e.g. `v1alpha1`)
    pub id: String,
}

/// A resource as read from a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    /// Where the resource was read from
    pub metadata: ResourceMetadata,

    /// Resource spec; a string for opaque documents such as machine configs
    pub spec: serde_yaml::Value,
}

impl ResourceSnapshot {
    /// The spec rendered as a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error when a structured spec cannot be serialized.
    pub fn spec_document(&self) -> Result<String, serde_yaml::Error> {
        match &self.spec {
            serde_yaml::Value::String(doc) => Ok(doc.clone()),
            other => serde_yaml::to_string(other),
        }
    }
}

/// Cluster topology hints for a health check. Empty lists let the check
/// discover members itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Control-plane node addresses
    pub control_plane_nodes: Vec<String>,
    /// Worker node addresses
    pub worker_nodes: Vec<String>,
}

/// One progress line of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthMessage {
    /// Node the message concerns, when reported
    pub node: Option<String>,
    /// Progress text
    pub message: String,
}

impl HealthMessage {
    /// Parses a talosctl health line, splitting a leading `node: ` prefix.
    #[must_use]
    pub fn from_line(line: &str) -> Self {
        let line = line.trim();
        match line.split_once(": ") {
            Some((node, message)) if !node.contains(' ') && node.contains('.') => Self {
                node: Some(node.to_string()),
                message: message.to_string(),
            },
            _ => Self {
                node: None,
                message: line.to_string(),
            },
        }
    }
}

impl std::fmt::Display for HealthMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{node}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_matches_alias() {
        let def = ResourceDefinition {
            type_: "MachineConfigs.config.talos.dev".to_string(),
            aliases: vec!["machineconfig".to_string(), "mc".to_string()],
            default_namespace: "config".to_string(),
        };

        assert!(def.matches("MachineConfig"));
        assert!(def.matches("machineconfigs.config.talos.dev"));
        assert!(!def.matches("members"));
    }

    #[test]
    fn test_select_definition_prefers_requested_namespace() {
        let definition = |type_: &str, namespace: &str| ResourceDefinition {
            type_: type_.to_string(),
            aliases: vec!["status".to_string()],
            default_namespace: namespace.to_string(),
        };
        let definitions = vec![
            definition("MachineStatuses.runtime.talos.dev", "runtime"),
            definition("ClusterStatuses.cluster.talos.dev", "cluster"),
        ];

        let in_cluster = select_definition(definitions.clone(), Some("cluster"), "status").unwrap();
        let unscoped = select_definition(definitions.clone(), None, "status").unwrap();
        let elsewhere = select_definition(definitions.clone(), Some("config"), "status").unwrap();

        assert_eq!(in_cluster.type_, "ClusterStatuses.cluster.talos.dev");
        assert_eq!(unscoped.type_, "MachineStatuses.runtime.talos.dev");
        assert_eq!(elsewhere.type_, "MachineStatuses.runtime.talos.dev");
        assert_eq!(select_definition(definitions, Some("cluster"), "members"), None);
    }

    #[test]
    fn test_metadata_falls_back_to_default_namespace() {
        let def = ResourceDefinition {
            type_: "MachineConfigs.config.talos.dev".to_string(),
            aliases: vec![],
            default_namespace: "config".to_string(),
        };

        assert_eq!(def.metadata("", "v1alpha1").namespace, "config");
        assert_eq!(def.metadata("other", "v1alpha1").namespace, "other");
    }

    #[test]
    fn test_spec_document_string_and_mapping() {
        let metadata = ResourceMetadata {
            namespace: "config".to_string(),
            type_: "MachineConfigs.config.talos.dev".to_string(),
            id: "v1alpha1".to_string(),
        };
        let raw = ResourceSnapshot {
            metadata: metadata.clone(),
            spec: serde_yaml::Value::String("version: v1alpha1\n".to_string()),
        };
        let structured = ResourceSnapshot {
            metadata,
            spec: serde_yaml::from_str("version: v1alpha1").unwrap(),
        };

        assert_eq!(raw.spec_document().unwrap(), "version: v1alpha1\n");
        assert_eq!(structured.spec_document().unwrap(), "version: v1alpha1\n");
    }

    #[test]
    fn test_health_message_from_line() {
        let with_node = HealthMessage::from_line("10.0.0.2: waiting for etcd to be healthy: OK");
        let plain = HealthMessage::from_line("discovered nodes: [\"10.0.0.2\"]");

        assert_eq!(with_node.node.as_deref(), Some("10.0.0.2"));
        assert_eq!(with_node.message, "waiting for etcd to be healthy: OK");
        assert_eq!(plain.node, None);
    }
}
