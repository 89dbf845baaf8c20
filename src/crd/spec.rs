//! # Tensegrity Spec
//!
//! Produce/consume declarations shared by every Tensegrity resource kind,
//! plus the defaulting rules applied before the engines run.

use crate::constants::{CONSUMED_SUFFIX, NAMESPACE_DELEGATE_KIND, PRODUCED_SUFFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to another object, inlined into produce/consume entries and key statuses.
///
/// Mirrors the shape of `core/v1.ObjectReference`. Empty fields are omitted.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Field-path expression evaluated against the referenced object
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_path: String,
}

impl ObjectReference {
    /// Reference to a namespace delegate
    #[must_use]
    pub fn namespace_delegate(name: &str) -> Self {
        Self {
            kind: NAMESPACE_DELEGATE_KIND.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// A key this resource publishes, extracted from another object
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProduceSpec {
    /// Name of the produced key
    pub key: String,
    /// Source object and the field path to extract
    #[serde(flatten)]
    pub reference: ObjectReference,
    /// Value must be published through the Secret output
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
    /// Value is already base64 encoded and is published as is
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encoded: bool,
}

impl ProduceSpec {
    /// Entry without a source kind: evaluated against an empty placeholder object
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.reference.kind.is_empty() && self.reference.api_version.is_empty()
    }
}

/// Keys this resource consumes from a producer resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeSpec {
    /// Producer resource (kind, apiVersion and name; the namespace comes from the delegate)
    #[serde(flatten)]
    pub reference: ObjectReference,
    /// Environment variable name to producer key
    #[serde(default)]
    pub maps: BTreeMap<String, String>,
}

/// Produce/consume declarations of a Tensegrity resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TensegritySpec {
    /// Ordered search path used to resolve consumed keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegates: Vec<ObjectReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<ConsumeSpec>,
    /// Defaults to `<name>-consumed`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consumes_secret_name: String,
    /// Defaults to `<name>-consumed`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consumes_config_map_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<ProduceSpec>,
    /// Defaults to `<name>-produced`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub produces_secret_name: String,
    /// Defaults to `<name>-produced`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub produces_config_map_name: String,
}

impl TensegritySpec {
    /// Return a copy with derived names, produce source names and the
    /// namespace delegate filled in.
    #[must_use]
    pub fn with_defaults(&self, name: &str, namespace: &str, namespace_delegate: bool) -> Self {
        let mut spec = self.clone();
        spec.set_default_names(name);
        spec.set_default_produces_name(name);
        if namespace_delegate {
            spec.set_default_namespace_delegate(namespace);
        }
        spec
    }

    pub fn set_default_names(&mut self, name: &str) {
        let produced = format!("{name}-{PRODUCED_SUFFIX}");
        let consumed = format!("{name}-{CONSUMED_SUFFIX}");
        if self.produces_config_map_name.is_empty() {
            self.produces_config_map_name.clone_from(&produced);
        }
        if self.produces_secret_name.is_empty() {
            self.produces_secret_name = produced;
        }
        if self.consumes_config_map_name.is_empty() {
            self.consumes_config_map_name.clone_from(&consumed);
        }
        if self.consumes_secret_name.is_empty() {
            self.consumes_secret_name = consumed;
        }
    }

    pub fn set_default_produces_name(&mut self, name: &str) {
        for produce in &mut self.produces {
            if produce.reference.name.is_empty() {
                produce.reference.name = name.to_string();
            }
        }
    }

    /// Prepend the resource's own namespace unless it is already a delegate
    pub fn set_default_namespace_delegate(&mut self, namespace: &str) {
        let present = self
            .delegates
            .iter()
            .any(|d| d.kind == NAMESPACE_DELEGATE_KIND && d.name == namespace);
        if !present {
            self.delegates
                .insert(0, ObjectReference::namespace_delegate(namespace));
        }
    }
}
