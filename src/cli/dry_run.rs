//! # Dry Run Command
//!
//! Runs the Sync pipeline against manifests on disk instead of a cluster.
//! Objects are loaded into a `MemoryStore`; a `Namespace` object is added for
//! every namespace the manifests mention so namespace delegates resolve.

use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tensegrity::config::ControllerConfig;
use tensegrity::controller::reconciler::{
    sync_resource, EngineConfig, MaterializedOutputs, MemoryStore, ObjectKey, Tracker,
};
use tensegrity::crd::{
    HasTensegritySpec, Static, TensegrityDaemonSet, TensegrityDeployment, TensegrityStatefulSet,
    TensegrityStatus,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid: Option<String>,
    status: TensegrityStatus,
    outputs: MaterializedOutputs,
}

/// Sync the resource in `resource` against the objects in `objects`
pub async fn dry_run_command(
    resource: &Path,
    objects: &[PathBuf],
    namespace: Option<&str>,
) -> Result<()> {
    let manifest = std::fs::read_to_string(resource)
        .with_context(|| format!("Failed to read {}", resource.display()))?;
    let mut value: serde_json::Value = serde_yaml::from_str(&manifest)
        .with_context(|| format!("Failed to parse {}", resource.display()))?;
    set_default_namespace(&mut value, namespace.unwrap_or("default"));

    let store = MemoryStore::new();
    let mut namespaces = BTreeSet::new();
    for path in objects {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for obj in parse_objects(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?
        {
            namespaces.extend(obj.namespace());
            let name = obj.name_any();
            if store.insert(obj).is_none() {
                tracing::warn!("Skipping {} in {}: no apiVersion/kind", name, path.display());
            }
        }
    }
    namespaces.extend(
        value
            .pointer("/metadata/namespace")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    );
    add_namespaces(&store, &namespaces);

    let engine = ControllerConfig::from_env().engine_config();
    let api_version = value
        .get("apiVersion")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let kind = value
        .get("kind")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    let report = if matches_kind::<Static>(&api_version, &kind) {
        run::<Static>(value, &store, engine).await?
    } else if matches_kind::<TensegrityDeployment>(&api_version, &kind) {
        run::<TensegrityDeployment>(value, &store, engine).await?
    } else if matches_kind::<TensegrityStatefulSet>(&api_version, &kind) {
        run::<TensegrityStatefulSet>(value, &store, engine).await?
    } else if matches_kind::<TensegrityDaemonSet>(&api_version, &kind) {
        run::<TensegrityDaemonSet>(value, &store, engine).await?
    } else {
        bail!(
            "Unsupported resource {api_version}/{kind} \
             (expected a Static, Deployment, StatefulSet or DaemonSet)"
        );
    };

    print!("{}", serde_yaml::to_string(&report)?);
    Ok(())
}

fn matches_kind<K: HasTensegritySpec>(api_version: &str, kind: &str) -> bool {
    K::api_version(&()) == api_version && K::kind(&()) == kind
}

async fn run<K: HasTensegritySpec>(
    value: serde_json::Value,
    store: &MemoryStore,
    engine: EngineConfig,
) -> Result<DryRunReport> {
    let resource: K = serde_json::from_value(value).context("Invalid resource manifest")?;
    let tracker = Tracker::new(Duration::from_secs(60));
    let outcome = sync_resource(&resource, store, &tracker, engine).await?;
    let dependent = ObjectKey::of(&resource);
    for tracked in store.objects().iter().filter_map(ObjectKey::of_dynamic) {
        if tracker.dependents(&tracked).contains(&dependent) {
            tracing::info!("Tracked read of {}", tracked);
        }
    }
    Ok(DryRunReport {
        invalid: outcome.invalid,
        status: outcome.status,
        outputs: outcome.outputs,
    })
}

fn set_default_namespace(value: &mut serde_json::Value, namespace: &str) {
    let Some(metadata) = value
        .get_mut("metadata")
        .and_then(serde_json::Value::as_object_mut)
    else {
        return;
    };
    metadata
        .entry("namespace")
        .or_insert_with(|| serde_json::Value::String(namespace.to_string()));
}

/// Parse a multi-document YAML stream, skipping empty documents
fn parse_objects(text: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        objects.push(serde_yaml::from_value(value)?);
    }
    Ok(objects)
}

fn add_namespaces(store: &MemoryStore, namespaces: &BTreeSet<String>) {
    let resource = ApiResource::erase::<Namespace>(&());
    for name in namespaces {
        let key = ObjectKey::new(&resource.api_version, &resource.kind, None, name);
        let present = store
            .objects()
            .iter()
            .filter_map(ObjectKey::of_dynamic)
            .any(|existing| existing == key);
        if !present {
            store.insert(DynamicObject::new(name, &resource));
        }
    }
}
