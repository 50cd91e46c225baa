//! Machine configuration errors

use thiserror::Error;

/// Errors raised while handling machine configuration documents
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Document is not valid YAML
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Document parsed, but its top level is not a mapping
    #[error("Machine config must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

pub(crate) fn kind_of(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}
