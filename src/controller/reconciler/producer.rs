//! # Producer Engine
//!
//! Recomputes the resource's produced keys from current cluster state:
//! fetch each source object, extract the field path, classify the value
//! and record a per-key status.
//!
//! Publication is all-or-nothing. If any key fails, neither the plaintext
//! nor the sensitive bucket is staged this cycle.

use super::extract::extract;
use super::materialize::PipelineContext;
use super::store::{ObjectKey, StoreError};
use crate::crd::{
    keys_not_produced_message, Condition, ConditionStatus, ConditionType, KeyStatus,
    ObjectReference, ProduceSpec, ProducedKeyStatus, TensegritySpec, TensegrityStatus,
    KEYS_NOT_PRODUCED_REASON, KEYS_PRODUCED_MESSAGE, KEYS_PRODUCED_REASON,
};
use crate::observability::metrics;
use base64::{engine::general_purpose, Engine as _};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;
use tracing::{debug, warn};

/// Run the producer over `spec.produces`, replacing the produced part of `status`.
pub async fn produce(
    ctx: &mut PipelineContext<'_>,
    spec: &TensegritySpec,
    status: &mut TensegrityStatus,
) {
    status.produced = None;
    status.produced_keys = Vec::with_capacity(spec.produces.len());
    ctx.produced.clear();

    if spec.produces.is_empty() {
        status.remove_condition(ConditionType::Produced);
        return;
    }

    for produce in &spec.produces {
        let key_status = produce_key(ctx, produce).await;
        metrics::record_produced_key(key_status.status.is_success());
        status.produced_keys.push(key_status);
    }

    let failed: Vec<&str> = status
        .produced_keys
        .iter()
        .filter(|k| !k.status.is_success())
        .map(|k| k.key.as_str())
        .collect();

    if failed.is_empty() {
        status.produced = Some(KeyStatus::Success);
        status.set_condition(Condition::new(
            ConditionType::Produced,
            ConditionStatus::True,
            KEYS_PRODUCED_REASON,
            KEYS_PRODUCED_MESSAGE,
        ));
    } else {
        debug!(
            "{}: {} of {} produced keys failed, clearing produced outputs",
            ctx.dependent,
            failed.len(),
            spec.produces.len()
        );
        let message = keys_not_produced_message(&failed);
        ctx.produced.clear();
        status.produced = Some(KeyStatus::Failure);
        status.set_condition(Condition::new(
            ConditionType::Produced,
            ConditionStatus::False,
            KEYS_NOT_PRODUCED_REASON,
            message,
        ));
    }
}

async fn produce_key(ctx: &mut PipelineContext<'_>, produce: &ProduceSpec) -> ProducedKeyStatus {
    let mut key_status = ProducedKeyStatus {
        reference: produce.reference.clone(),
        status: KeyStatus::Success,
        reason: None,
        key: produce.key.clone(),
        sensitive: produce.sensitive,
        encoded: produce.encoded,
        value: None,
    };

    let source = match fetch_source(ctx, produce).await {
        Ok(source) => source,
        Err(e) => {
            warn!(
                key = %produce.key,
                source.kind = %produce.reference.kind,
                source.name = %produce.reference.name,
                "Failed to fetch produce source for {}: {}",
                ctx.dependent,
                e
            );
            key_status.status = KeyStatus::Failure;
            key_status.reason = Some(e.to_string());
            return key_status;
        }
    };

    if let Some(obj) = &source.object {
        key_status.reference = reference_of(obj, &produce.reference.field_path);
    }

    match extract(&source.tree, &produce.reference.field_path) {
        Ok(value) => {
            match (produce.sensitive, produce.encoded) {
                (true, true) => {
                    ctx.produced.sensitive.insert(produce.key.clone(), value);
                }
                (true, false) => {
                    ctx.produced
                        .sensitive
                        .insert(produce.key.clone(), general_purpose::STANDARD.encode(&value));
                }
                _ => {
                    ctx.produced
                        .plaintext
                        .insert(produce.key.clone(), value.clone());
                    key_status.value = Some(value);
                }
            }
        }
        Err(e) => {
            warn!(
                key = %produce.key,
                field_path = %produce.reference.field_path,
                "Failed to extract produced key for {}: {}",
                ctx.dependent,
                e
            );
            key_status.status = KeyStatus::Failure;
            key_status.reason = Some(e.to_string());
        }
    }
    key_status
}

struct Source {
    object: Option<DynamicObject>,
    tree: Value,
}

/// Source object of a produce entry, fetched in the resource's namespace.
/// An entry without kind and apiVersion reads from an empty placeholder.
async fn fetch_source(
    ctx: &PipelineContext<'_>,
    produce: &ProduceSpec,
) -> Result<Source, StoreError> {
    if produce.is_placeholder() {
        return Ok(Source {
            object: None,
            tree: Value::Object(serde_json::Map::new()),
        });
    }

    let reference = &produce.reference;
    let key = ObjectKey::new(
        &reference.api_version,
        &reference.kind,
        Some(ctx.namespace()),
        &reference.name,
    );
    let obj = ctx
        .tracked_get(&key)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: reference.kind.clone(),
            name: reference.name.clone(),
        })?;
    let tree = serde_json::to_value(&obj)?;
    Ok(Source {
        object: Some(obj),
        tree,
    })
}

/// Reference to a fetched object, as recorded in key statuses
pub(crate) fn reference_of(obj: &DynamicObject, field_path: &str) -> ObjectReference {
    let (api_version, kind) = obj
        .types
        .as_ref()
        .map(|t| (t.api_version.clone(), t.kind.clone()))
        .unwrap_or_default();
    ObjectReference {
        api_version,
        kind,
        namespace: obj.namespace().unwrap_or_default(),
        name: obj.name_any(),
        uid: obj.uid().unwrap_or_default(),
        resource_version: obj.resource_version().unwrap_or_default(),
        field_path: field_path.to_string(),
    }
}
