//! # Tensegrity Status
//!
//! Engine output: per-key outcomes, aggregate flags, materialized object
//! names and conditions. The status is recomputed on every reconciliation.

use super::conditions::Condition;
use super::spec::ObjectReference;
use serde::{Deserialize, Serialize};

/// Outcome of a single key, and the aggregate over all keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum KeyStatus {
    Success,
    Failure,
}

impl KeyStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Success => "Success",
            KeyStatus::Failure => "Failure",
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, KeyStatus::Success)
    }
}

/// Outcome of one produced key
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProducedKeyStatus {
    /// Source object the value was extracted from
    #[serde(flatten)]
    pub reference: ObjectReference,
    pub status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
    /// Source value is already base64 encoded
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encoded: bool,
    /// Extracted value; never recorded for sensitive keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Outcome of one consumed env
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedKeyStatus {
    /// Producer resource the key was consumed from
    #[serde(flatten)]
    pub reference: ObjectReference,
    /// Delegate scope in which the producer was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<ObjectReference>,
    pub status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub key: String,
    pub env: String,
}

/// Status shared by every Tensegrity resource kind
///
/// Optional fields serialize as `null` so a merge patch clears stale values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TensegrityStatus {
    /// Whether every consumed env was resolved
    #[serde(default)]
    pub consumed: Option<KeyStatus>,
    #[serde(default)]
    pub consumed_keys: Vec<ConsumedKeyStatus>,
    #[serde(default)]
    pub consumed_secret_name: Option<String>,
    #[serde(default)]
    pub consumed_config_map_name: Option<String>,
    /// Whether every produced key was extracted
    #[serde(default)]
    pub produced: Option<KeyStatus>,
    #[serde(default)]
    pub produced_keys: Vec<ProducedKeyStatus>,
    #[serde(default)]
    pub produced_secret_name: Option<String>,
    #[serde(default)]
    pub produced_config_map_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl TensegrityStatus {
    /// Look up a successfully produced key by name
    #[must_use]
    pub fn produced_key(&self, key: &str) -> Option<&ProducedKeyStatus> {
        self.produced_keys
            .iter()
            .find(|p| p.key == key && p.status.is_success())
    }
}
