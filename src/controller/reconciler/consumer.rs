//! # Consumer Engine
//!
//! Resolves each consume entry by walking the resource's delegates in
//! order. A delegate satisfies an entry when the referenced producer exists
//! in the delegate's namespace and every key the entry maps can be read
//! from it. The first satisfying delegate wins; entries are resolved
//! independently of each other.
//!
//! Values come either from the producer's published status (re-extracting
//! sensitive keys from their source object) or from the producer's
//! materialized ConfigMap and Secret, depending on `ConsumeSource`.

use super::extract::extract;
use super::materialize::PipelineContext;
use super::store::ObjectKey;
use super::types::{ConsumeSource, ReconcilerError};
use crate::constants::{CONSUMED_KEY_NOT_FOUND, NAMESPACE_DELEGATE_KIND};
use crate::crd::{
    keys_not_consumed_message, Condition, ConditionStatus, ConditionType, ConsumeSpec,
    ConsumedKeyStatus, KeyStatus, ObjectReference, TensegritySpec, TensegrityStatus,
    KEYS_CONSUMED_MESSAGE, KEYS_CONSUMED_REASON, KEYS_NOT_CONSUMED_REASON,
};
use crate::observability::metrics;
use base64::{engine::general_purpose, Engine as _};
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A value resolved for one env
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Plaintext(String),
    /// base64 encoded
    Sensitive(String),
}

/// Run the consumer over `spec.consumes`, replacing the consumed part of `status`.
///
/// # Errors
///
/// Aborts on a delegate of an unsupported kind, on missing delegates when
/// they are required, and on store failures other than absence.
pub async fn consume(
    ctx: &mut PipelineContext<'_>,
    spec: &TensegritySpec,
    status: &mut TensegrityStatus,
) -> Result<(), ReconcilerError> {
    status.consumed = None;
    status.consumed_keys = Vec::new();
    ctx.consumed.clear();

    if spec.consumes.is_empty() {
        status.remove_condition(ConditionType::Consumed);
        return Ok(());
    }
    if spec.delegates.is_empty() && ctx.config.require_delegates {
        return Err(ReconcilerError::MissingDelegates);
    }

    let mut pending: Vec<usize> = (0..spec.consumes.len()).collect();
    let mut resolved: BTreeMap<usize, (ObjectReference, BTreeMap<String, Resolved>)> =
        BTreeMap::new();

    for delegate in &spec.delegates {
        if pending.is_empty() {
            break;
        }
        if delegate.kind != NAMESPACE_DELEGATE_KIND {
            return Err(ReconcilerError::UnsupportedDelegateKind(delegate.kind.clone()));
        }
        let namespace_key = ObjectKey::new("v1", NAMESPACE_DELEGATE_KIND, None, &delegate.name);
        if ctx.tracked_get(&namespace_key).await?.is_none() {
            debug!("{}: delegate namespace {} not found", ctx.dependent, delegate.name);
            continue;
        }

        let mut still_pending = Vec::with_capacity(pending.len());
        for index in pending {
            let entry = &spec.consumes[index];
            match resolve_in_namespace(ctx, entry, &delegate.name).await? {
                Some(values) => {
                    debug!(
                        "{}: resolved {}/{} from delegate {}",
                        ctx.dependent, entry.reference.kind, entry.reference.name, delegate.name
                    );
                    resolved.insert(index, (delegate.clone(), values));
                }
                None => still_pending.push(index),
            }
        }
        pending = still_pending;
    }

    for (index, entry) in spec.consumes.iter().enumerate() {
        match resolved.remove(&index) {
            Some((delegate, values)) => {
                for (env, value) in values {
                    match value {
                        Resolved::Plaintext(v) => ctx.consumed.plaintext.insert(env, v),
                        Resolved::Sensitive(v) => ctx.consumed.sensitive.insert(env, v),
                    };
                }
                record_entry(status, entry, Some(&delegate));
            }
            None => {
                info!(
                    "{}: consumed keys from {}/{} are not found in any delegate",
                    ctx.dependent, entry.reference.kind, entry.reference.name
                );
                record_entry(status, entry, None);
            }
        }
    }

    let failed: Vec<&str> = status
        .consumed_keys
        .iter()
        .filter(|k| !k.status.is_success())
        .map(|k| k.env.as_str())
        .collect();

    if failed.is_empty() {
        status.consumed = Some(KeyStatus::Success);
        status.set_condition(Condition::new(
            ConditionType::Consumed,
            ConditionStatus::True,
            KEYS_CONSUMED_REASON,
            KEYS_CONSUMED_MESSAGE,
        ));
    } else {
        let message = keys_not_consumed_message(&failed);
        status.consumed = Some(KeyStatus::Failure);
        status.set_condition(Condition::new(
            ConditionType::Consumed,
            ConditionStatus::False,
            KEYS_NOT_CONSUMED_REASON,
            message,
        ));
    }
    Ok(())
}

/// One status per mapped env, successful when `delegate` is set
fn record_entry(
    status: &mut TensegrityStatus,
    entry: &ConsumeSpec,
    delegate: Option<&ObjectReference>,
) {
    for (env, key) in &entry.maps {
        let success = delegate.is_some();
        metrics::record_consumed_key(success);
        status.consumed_keys.push(ConsumedKeyStatus {
            reference: entry.reference.clone(),
            delegate: delegate.cloned(),
            status: if success {
                KeyStatus::Success
            } else {
                KeyStatus::Failure
            },
            reason: (!success).then(|| CONSUMED_KEY_NOT_FOUND.to_string()),
            key: key.clone(),
            env: env.clone(),
        });
    }
}

/// Resolve every env of `entry` from the producer in `namespace`.
/// `None` when the producer is absent or any mapped key is unavailable.
async fn resolve_in_namespace(
    ctx: &PipelineContext<'_>,
    entry: &ConsumeSpec,
    namespace: &str,
) -> Result<Option<BTreeMap<String, Resolved>>, ReconcilerError> {
    let producer_key = ObjectKey::new(
        &entry.reference.api_version,
        &entry.reference.kind,
        Some(namespace),
        &entry.reference.name,
    );
    let Some(producer) = ctx.tracked_get(&producer_key).await? else {
        return Ok(None);
    };
    let producer_status: TensegrityStatus = match producer.data.get("status") {
        Some(status) if !status.is_null() => match serde_json::from_value(status.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("{}: unreadable status on {}: {}", ctx.dependent, producer_key, e);
                return Ok(None);
            }
        },
        _ => return Ok(None),
    };

    match ctx.config.consume_source {
        ConsumeSource::ProducerStatus => {
            resolve_from_status(ctx, entry, &producer_status).await
        }
        ConsumeSource::PublishedObjects => {
            resolve_from_objects(ctx, entry, &producer_status, namespace).await
        }
    }
}

async fn resolve_from_status(
    ctx: &PipelineContext<'_>,
    entry: &ConsumeSpec,
    producer_status: &TensegrityStatus,
) -> Result<Option<BTreeMap<String, Resolved>>, ReconcilerError> {
    let mut values = BTreeMap::new();
    for (env, key) in &entry.maps {
        let Some(produced) = producer_status.produced_key(key) else {
            return Ok(None);
        };
        let value = if produced.sensitive {
            let Some(raw) = re_extract(ctx, &produced.reference).await? else {
                return Ok(None);
            };
            if produced.encoded {
                Resolved::Sensitive(raw)
            } else {
                Resolved::Sensitive(general_purpose::STANDARD.encode(raw))
            }
        } else {
            match &produced.value {
                Some(v) => Resolved::Plaintext(v.clone()),
                None => return Ok(None),
            }
        };
        values.insert(env.clone(), value);
    }
    Ok(Some(values))
}

/// Raw value of a sensitive key, read again from its source object
async fn re_extract(
    ctx: &PipelineContext<'_>,
    reference: &ObjectReference,
) -> Result<Option<String>, ReconcilerError> {
    let tree = if reference.kind.is_empty() && reference.api_version.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        let key = ObjectKey::new(
            &reference.api_version,
            &reference.kind,
            Some(reference.namespace.as_str()),
            &reference.name,
        );
        match ctx.tracked_get(&key).await? {
            Some(obj) => serde_json::to_value(&obj)?,
            None => return Ok(None),
        }
    };
    match extract(&tree, &reference.field_path) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!(
                "{}: sensitive key from {} {} no longer extracts: {}",
                ctx.dependent, reference.kind, reference.name, e
            );
            Ok(None)
        }
    }
}

async fn resolve_from_objects(
    ctx: &PipelineContext<'_>,
    entry: &ConsumeSpec,
    producer_status: &TensegrityStatus,
    namespace: &str,
) -> Result<Option<BTreeMap<String, Resolved>>, ReconcilerError> {
    let config_map = match &producer_status.produced_config_map_name {
        Some(name) => {
            let key = ObjectKey::new("v1", "ConfigMap", Some(namespace), name);
            match ctx.tracked_get(&key).await? {
                Some(obj) => string_map(&obj, "data"),
                None => return Ok(None),
            }
        }
        None => BTreeMap::new(),
    };
    let secret = match &producer_status.produced_secret_name {
        Some(name) => {
            let key = ObjectKey::new("v1", "Secret", Some(namespace), name);
            match ctx.tracked_get(&key).await? {
                // Secret data is already base64 on the wire.
                Some(obj) => string_map(&obj, "data"),
                None => return Ok(None),
            }
        }
        None => BTreeMap::new(),
    };

    let mut values = BTreeMap::new();
    for (env, key) in &entry.maps {
        let value = if let Some(v) = config_map.get(key) {
            Resolved::Plaintext(v.clone())
        } else if let Some(v) = secret.get(key) {
            Resolved::Sensitive(v.clone())
        } else {
            return Ok(None);
        };
        values.insert(env.clone(), value);
    }
    Ok(Some(values))
}

fn string_map(obj: &DynamicObject, field: &str) -> BTreeMap<String, String> {
    obj.data
        .get(field)
        .and_then(serde_json::Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::memory::MemoryStore;
    use crate::controller::reconciler::tracker::Tracker;
    use crate::controller::reconciler::types::EngineConfig;
    use serde_json::json;
    use std::time::Duration;

    fn delegate(kind: &str, name: &str) -> ObjectReference {
        ObjectReference {
            kind: kind.to_string(),
            name: name.to_string(),
            ..ObjectReference::default()
        }
    }

    #[tokio::test]
    async fn test_unsupported_delegate_kind_aborts() {
        let store = MemoryStore::new();
        let tracker = Tracker::new(Duration::from_secs(60));
        let dependent = ObjectKey::new(
            "k8s.tensegrity.fastforge.io/v1alpha1",
            "Deployment",
            Some("team-a"),
            "billing",
        );
        let mut ctx = PipelineContext::new(&store, &tracker, EngineConfig::default(), dependent);
        let spec = TensegritySpec {
            delegates: vec![
                delegate(NAMESPACE_DELEGATE_KIND, "absent"),
                delegate("Cluster", "global"),
            ],
            consumes: vec![ConsumeSpec {
                reference: delegate("Static", "database"),
                maps: [("DB_HOST".to_string(), "host".to_string())].into_iter().collect(),
            }],
            ..TensegritySpec::default()
        };
        let mut status = TensegrityStatus::default();

        let result = consume(&mut ctx, &spec, &mut status).await;

        match result {
            Err(ReconcilerError::UnsupportedDelegateKind(kind)) => assert_eq!(kind, "Cluster"),
            other => panic!("expected an unsupported delegate kind, got {other:?}"),
        }
    }

    #[test]
    fn test_string_map_skips_non_strings() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "settings" },
            "data": { "a": "1", "b": 2 }
        }))
        .expect("valid object");
        let map = string_map(&obj, "data");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert!(string_map(&obj, "binaryData").is_empty());
    }

    #[test]
    fn test_failed_entry_records_every_env() {
        let mut status = TensegrityStatus::default();
        let entry = ConsumeSpec {
            reference: ObjectReference {
                kind: "Static".to_string(),
                name: "auth".to_string(),
                ..ObjectReference::default()
            },
            maps: [
                ("DB_PORT".to_string(), "port".to_string()),
                ("DB_HOST".to_string(), "host".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        record_entry(&mut status, &entry, None);
        let envs: Vec<&str> = status.consumed_keys.iter().map(|k| k.env.as_str()).collect();
        assert_eq!(envs, vec!["DB_HOST", "DB_PORT"]);
        assert!(status
            .consumed_keys
            .iter()
            .all(|k| k.reason.as_deref() == Some(CONSUMED_KEY_NOT_FOUND) && k.delegate.is_none()));
    }
}
