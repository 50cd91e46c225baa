//! Status conditions and the condition ledger.
//!
//! Conditions follow the Kubernetes API conventions: one entry per condition
//! type, with `lastTransitionTime` and `observedGeneration` moving only when the
//! status value flips.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting whether the node's API endpoint answered a probe.
pub const CONDITION_AVAILABLE: &str = "Available";

/// Condition type summarizing all checks for a Machine.
pub const CONDITION_READY: &str = "Ready";

/// Status of a condition.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Kubernetes-style condition for status reporting.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Available, Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Generation of the resource the status was last computed against
    #[serde(default)]
    pub observed_generation: i64,

    /// Last time the condition status changed
    pub last_transition_time: DateTime<Utc>,
}

/// Looks up a condition by type.
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().rev().find(|c| c.type_ == type_)
}

/// Keyed view over a resource's conditions.
///
/// Entries are kept in insertion order, but iteration order carries no
/// meaning: look conditions up by type only.
#[derive(Clone, Debug, Default)]
pub struct ConditionLedger {
    entries: Vec<Condition>,
}

impl ConditionLedger {
    /// Seeds the ledger from existing conditions. A later duplicate of a type
    /// replaces the earlier one.
    #[must_use]
    pub fn from_conditions<I>(conditions: I) -> Self
    where
        I: IntoIterator<Item = Condition>,
    {
        let mut entries: Vec<Condition> = Vec::new();
        for condition in conditions {
            match entries.iter_mut().find(|c| c.type_ == condition.type_) {
                Some(slot) => *slot = condition,
                None => entries.push(condition),
            }
        }
        Self { entries }
    }

    /// Upserts a condition using the current wall clock.
    pub fn upsert(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        generation: i64,
    ) -> &Condition {
        self.upsert_at(type_, status, reason, message, generation, Utc::now())
    }

    /// Upserts a condition as of `now`.
    ///
    /// `observed_generation` and `last_transition_time` are taken from the
    /// arguments only when the type is new or its status changed; otherwise
    /// the prior values are kept. Reason and message always take the new
    /// values.
    pub fn upsert_at(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        generation: i64,
        now: DateTime<Utc>,
    ) -> &Condition {
        let index = match self.entries.iter().position(|c| c.type_ == type_) {
            Some(index) => {
                let prior = &mut self.entries[index];
                if prior.status != status {
                    prior.status = status;
                    prior.observed_generation = generation;
                    prior.last_transition_time = now;
                }
                prior.reason = reason.to_string();
                prior.message = message.to_string();
                index
            }
            None => {
                self.entries.push(Condition {
                    type_: type_.to_string(),
                    status,
                    reason: reason.to_string(),
                    message: message.to_string(),
                    observed_generation: generation,
                    last_transition_time: now,
                });
                self.entries.len() - 1
            }
        };
        &self.entries[index]
    }

    /// Returns the condition of the given type, if present.
    #[must_use]
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.entries.iter().find(|c| c.type_ == type_)
    }

    /// Number of distinct condition types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no condition has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the ledger, returning the conditions to persist.
    #[must_use]
    pub fn into_conditions(self) -> Vec<Condition> {
        self.entries
    }
}
