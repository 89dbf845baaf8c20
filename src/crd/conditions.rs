//! # Conditions
//!
//! Resource-level conditions folded from per-key outcomes, and the
//! set/remove rules that keep repeated reconciliations from churning status.

use super::status::TensegrityStatus;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Some keys could not be produced
pub const KEYS_NOT_PRODUCED_REASON: &str = "KeysNotProduced";
/// Every key was produced
pub const KEYS_PRODUCED_REASON: &str = "KeysProduced";
pub const KEYS_PRODUCED_MESSAGE: &str = "All keys are produced.";
/// Some envs could not be consumed
pub const KEYS_NOT_CONSUMED_REASON: &str = "KeysNotConsumed";
/// Every env was consumed
pub const KEYS_CONSUMED_REASON: &str = "KeysConsumed";
pub const KEYS_CONSUMED_MESSAGE: &str = "All keys are consumed.";
/// The spec failed validation
pub const SPEC_INVALID_REASON: &str = "SpecInvalid";

#[must_use]
pub fn keys_not_produced_message(keys: &[&str]) -> String {
    format!("Keys are not produced: {}.", keys.join(", "))
}

#[must_use]
pub fn keys_not_consumed_message(envs: &[&str]) -> String {
    format!("Keys are not consumed for envs: {}.", envs.join(", "))
}

#[must_use]
pub fn spec_invalid_message(errors: &str) -> String {
    format!("Spec is invalid: {errors}.")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionType {
    /// All consumed keys were resolved
    Consumed,
    /// All produced keys were extracted
    Produced,
    /// The spec cannot be interpreted
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A named boolean status with reason, message and transition time
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    /// RFC3339, seconds precision
    pub last_update_time: String,
    /// RFC3339, seconds precision
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
}

impl Condition {
    /// New condition stamped with the current time
    #[must_use]
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            condition_type,
            status,
            last_update_time: now.clone(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl TensegrityStatus {
    #[must_use]
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Record a condition. Returns whether the condition list changed.
    ///
    /// An existing condition with the same status, reason and message is left
    /// untouched. When only reason or message differ the previous transition
    /// time is carried over.
    pub fn set_condition(&mut self, mut condition: Condition) -> bool {
        if let Some(current) = self.condition(condition.condition_type) {
            if current.status == condition.status
                && current.reason == condition.reason
                && current.message == condition.message
            {
                return false;
            }
            if current.status == condition.status {
                condition
                    .last_transition_time
                    .clone_from(&current.last_transition_time);
            }
        }
        self.conditions
            .retain(|c| c.condition_type != condition.condition_type);
        self.conditions.push(condition);
        true
    }

    /// Drop a condition. Returns whether one was present.
    pub fn remove_condition(&mut self, condition_type: ConditionType) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.condition_type != condition_type);
        before != self.conditions.len()
    }
}
