//! Machine label selectors.
//!
//! `MachineSelector` is the CRD-facing shape (the same as a Kubernetes
//! `LabelSelector`). Label keys, values and operator arity are validated
//! here; the resulting `LabelQuery` wraps a `kube::core::Selector`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::core::{Selector, SelectorExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised when a selector cannot be turned into a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// Selector has neither labels nor expressions
    #[error("selector is empty")]
    Empty,

    /// Label key is not a valid qualified name
    #[error("invalid label key {0:?}")]
    InvalidKey(String),

    /// Label value is not valid
    #[error("invalid label value {value:?} for key {key:?}")]
    InvalidValue {
        /// Key the value belongs to
        key: String,
        /// Offending value
        value: String,
    },

    /// In/NotIn given no values, or Exists/DoesNotExist given some
    #[error("operator {operator} on key {key:?} {reason}")]
    InvalidRequirement {
        /// Key of the requirement
        key: String,
        /// Operator of the requirement
        operator: SelectorOperator,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Selector rejected by kube's selector conversion
    #[error("invalid selector: {0}")]
    Parse(String),
}

/// Set-based selector operator.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SelectorOperator {
    /// Label value is one of the values
    In,
    /// Label is absent or its value is none of the values
    NotIn,
    /// Label is present
    Exists,
    /// Label is absent
    DoesNotExist,
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "In"),
            Self::NotIn => write!(f, "NotIn"),
            Self::Exists => write!(f, "Exists"),
            Self::DoesNotExist => write!(f, "DoesNotExist"),
        }
    }
}

/// One expression of a selector.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    /// Label key the expression applies to
    pub key: String,
    /// Operator relating the key to the values
    pub operator: SelectorOperator,
    /// Values for In/NotIn; must be empty for Exists/DoesNotExist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Selects Machines by their labels.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSelector {
    /// Exact label matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    /// Set-based expressions, ANDed with `match_labels`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

impl MachineSelector {
    /// Builds a selector from exact label matches.
    #[must_use]
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            match_expressions: Vec::new(),
        }
    }

    /// True when the selector has neither labels nor expressions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Validates the selector and converts it into a query.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::Empty`] for an empty selector, or a
    /// validation error for malformed keys, values or expressions.
    pub fn to_query(&self) -> Result<LabelQuery, SelectorError> {
        if self.is_empty() {
            return Err(SelectorError::Empty);
        }
        for (key, value) in &self.match_labels {
            validate_key(key)?;
            validate_value(key, value)?;
        }
        for expr in &self.match_expressions {
            validate_requirement(expr)?;
        }

        let selector = Selector::try_from(self.to_label_selector()).map_err(|e| SelectorError::Parse(e.0))?;
        Ok(LabelQuery(selector))
    }

    /// The selector as a Kubernetes `LabelSelector`.
    #[must_use]
    pub fn to_label_selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: (!self.match_labels.is_empty()).then(|| self.match_labels.clone()),
            match_expressions: (!self.match_expressions.is_empty()).then(|| {
                self.match_expressions
                    .iter()
                    .map(|expr| LabelSelectorRequirement {
                        key: expr.key.clone(),
                        operator: expr.operator.to_string(),
                        values: (!expr.values.is_empty()).then(|| expr.values.clone()),
                    })
                    .collect()
            }),
        }
    }
}

/// Validated label query, ANDing all requirements.
///
/// Renders as a label-selector string for list calls and can be evaluated
/// locally against a label set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelQuery(Selector);

impl LabelQuery {
    /// The underlying kube selector.
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.0
    }

    /// Evaluates the query against a label set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.matches(labels)
    }
}

impl fmt::Display for LabelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(is_name_char)
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric())
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    let prefix_ok = prefix.is_none_or(|p| {
        !p.is_empty()
            && p.len() <= 253
            && p.split('.').all(|label| {
                !label.is_empty()
                    && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            })
    });

    if prefix_ok && is_valid_name(name) {
        Ok(())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}

fn validate_requirement(expr: &SelectorRequirement) -> Result<(), SelectorError> {
    validate_key(&expr.key)?;
    let reason = match expr.operator {
        SelectorOperator::In | SelectorOperator::NotIn if expr.values.is_empty() => "requires at least one value",
        SelectorOperator::Exists | SelectorOperator::DoesNotExist if !expr.values.is_empty() => "must not have values",
        _ => {
            for value in &expr.values {
                validate_value(&expr.key, value)?;
            }
            return Ok(());
        }
    };
    Err(SelectorError::InvalidRequirement {
        key: expr.key.clone(),
        operator: expr.operator,
        reason,
    })
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || is_valid_name(value) {
        Ok(())
    } else {
        Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
