//! Common test utilities for the pipeline integration tests
//!
//! Fixtures for cluster objects and Tensegrity resources, and a helper that
//! runs one full reconciliation against a `MemoryStore`.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tensegrity::controller::reconciler::{
    apply_outcome, sync_resource, EngineConfig, MemoryStore, ObjectKey, ObjectStore,
    ReconcilerError, SyncOutcome, Tracker,
};
use tensegrity::crd::{
    ConsumeSpec, HasTensegritySpec, ObjectReference, ProduceSpec, Static, StaticSpec,
    TensegrityDeployment, TensegrityDeploymentSpec, TensegritySpec,
};

pub const STATIC_API_VERSION: &str = "tensegrity.fastforge.io/v1alpha1";

pub fn object(value: serde_json::Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid object")
}

pub fn namespace(name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    }))
}

pub fn service(namespace: &str, name: &str, cluster_ip: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "clusterIP": cluster_ip, "ports": [{ "name": "pg", "port": 5432 }] },
    }))
}

/// Secret with `data` holding the base64 encoding of each plaintext value
pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> DynamicObject {
    let data: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| ((*k).to_string(), json!(general_purpose::STANDARD.encode(v))))
        .collect();
    object(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "data": data,
    }))
}

pub fn produce(key: &str, kind: &str, name: &str, field_path: &str) -> ProduceSpec {
    ProduceSpec {
        key: key.to_string(),
        reference: ObjectReference {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            field_path: field_path.to_string(),
            ..ObjectReference::default()
        },
        ..ProduceSpec::default()
    }
}

pub fn sensitive(mut entry: ProduceSpec, encoded: bool) -> ProduceSpec {
    entry.sensitive = true;
    entry.encoded = encoded;
    entry
}

/// Consume entry against a `Static` producer
pub fn consume(producer: &str, maps: &[(&str, &str)]) -> ConsumeSpec {
    ConsumeSpec {
        reference: ObjectReference {
            api_version: STATIC_API_VERSION.to_string(),
            kind: "Static".to_string(),
            name: producer.to_string(),
            ..ObjectReference::default()
        },
        maps: maps
            .iter()
            .map(|(env, key)| ((*env).to_string(), (*key).to_string()))
            .collect(),
    }
}

pub fn static_resource(namespace: &str, name: &str, produces: Vec<ProduceSpec>) -> Static {
    let mut resource = Static::new(
        name,
        StaticSpec {
            tensegrity: TensegritySpec {
                produces,
                ..TensegritySpec::default()
            },
        },
    );
    resource.metadata.namespace = Some(namespace.to_string());
    resource
}

/// Store `resource` and return it as read back, with uid and resourceVersion set
pub async fn seed<K: HasTensegritySpec>(store: &MemoryStore, resource: &K) -> K {
    let obj: DynamicObject =
        serde_json::from_value(serde_json::to_value(resource).expect("serializable"))
            .expect("dynamic object");
    store.insert(obj).expect("typed object");
    reload(store, resource).await
}

/// Current stored state of `resource`
pub async fn reload<K: HasTensegritySpec>(store: &MemoryStore, resource: &K) -> K {
    let key = ObjectKey::of(resource);
    let obj = store.get(&key).await.expect("get").expect("present");
    typed(obj)
}

pub fn typed<K: DeserializeOwned>(obj: DynamicObject) -> K {
    serde_json::from_value(serde_json::to_value(obj).expect("serializable")).expect("typed")
}

pub fn tracker() -> Tracker {
    Tracker::new(Duration::from_secs(3600))
}

/// Sync `resource` as currently stored and write its children and status
pub async fn reconcile_once<K: HasTensegritySpec>(
    store: &MemoryStore,
    tracker: &Tracker,
    resource: &K,
    engine: EngineConfig,
) -> Result<SyncOutcome, ReconcilerError> {
    let current = reload(store, resource).await;
    let outcome = sync_resource(&current, store, tracker, engine).await?;
    if outcome.invalid.is_none() {
        apply_outcome(&current, store, &outcome).await?;
    }
    Ok(outcome)
}

/// Decoded `data` of a stored Secret
pub async fn secret_data(
    store: &MemoryStore,
    namespace: &str,
    name: &str,
) -> Option<BTreeMap<String, String>> {
    let key = ObjectKey::new("v1", "Secret", Some(namespace), name);
    let obj = store.get(&key).await.expect("get")?;
    let data = obj.data.get("data")?.as_object()?.clone();
    Some(
        data.into_iter()
            .map(|(k, v)| {
                let bytes = general_purpose::STANDARD
                    .decode(v.as_str().unwrap_or_default())
                    .expect("base64");
                (k, String::from_utf8(bytes).expect("utf8"))
            })
            .collect(),
    )
}

/// `data` of a stored ConfigMap
pub async fn config_map_data(
    store: &MemoryStore,
    namespace: &str,
    name: &str,
) -> Option<BTreeMap<String, String>> {
    let key = ObjectKey::new("v1", "ConfigMap", Some(namespace), name);
    let obj = store.get(&key).await.expect("get")?;
    let data = obj.data.get("data")?.as_object()?.clone();
    Some(
        data.into_iter()
            .map(|(k, v)| (k, v.as_str().unwrap_or_default().to_string()))
            .collect(),
    )
}

/// Apply `change` to the stored `resource` and write it back, keeping its status
pub async fn update<K: HasTensegritySpec>(
    store: &MemoryStore,
    resource: &K,
    change: impl FnOnce(&mut K),
) -> K {
    let mut current = reload(store, resource).await;
    change(&mut current);
    let key = ObjectKey::of(&current);
    let obj: DynamicObject =
        serde_json::from_value(serde_json::to_value(&current).expect("serializable"))
            .expect("dynamic object");
    store.replace(&key, &obj).await.expect("replace");
    reload(store, resource).await
}

/// `Deployment` consumer in `namespace` with a single container
pub fn deployment_resource(
    namespace: &str,
    name: &str,
    delegates: &[&str],
    consumes: Vec<ConsumeSpec>,
) -> TensegrityDeployment {
    let deployment: DeploymentSpec = serde_json::from_value(json!({
        "selector": { "matchLabels": { "app": name } },
        "template": {
            "metadata": { "labels": { "app": name } },
            "spec": { "containers": [{ "name": name, "image": format!("{name}:1.0") }] },
        },
    }))
    .expect("deployment spec");
    let mut resource = TensegrityDeployment::new(
        name,
        TensegrityDeploymentSpec {
            deployment,
            tensegrity: TensegritySpec {
                delegates: delegates
                    .iter()
                    .map(|d| ObjectReference::namespace_delegate(d))
                    .collect(),
                consumes,
                ..TensegritySpec::default()
            },
        },
    );
    resource.metadata.namespace = Some(namespace.to_string());
    resource
}

pub fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
