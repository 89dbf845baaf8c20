//! # Child Objects
//!
//! Writes the materialized ConfigMaps and Secrets and the workload child.
//! Every child carries the parent's labels, a controller owner reference
//! and a `reconciler` annotation naming the role that manages it.
//!
//! Children that are not controlled by the parent are never modified or
//! deleted. Updates re-read the child and replace it under its current
//! resourceVersion, retrying on conflict.

use super::materialize::StagedOutput;
use super::retry::retry_on_conflict;
use super::store::{ObjectKey, ObjectStore, StoreError};
use super::workload::WorkloadKind;
use crate::constants::RECONCILER_ANNOTATION;
use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Which reconciler manages a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    ProducerConfigMap,
    ProducerSecret,
    ConsumerConfigMap,
    ConsumerSecret,
    Workload(WorkloadKind),
}

impl ChildRole {
    /// Value of the `reconciler` annotation
    #[must_use]
    pub fn annotation(&self) -> &'static str {
        match self {
            ChildRole::ProducerConfigMap => "ProducerConfigMapReconciler",
            ChildRole::ProducerSecret => "ProducerSecretReconciler",
            ChildRole::ConsumerConfigMap => "ConsumerConfigMapReconciler",
            ChildRole::ConsumerSecret => "ConsumerSecretReconciler",
            ChildRole::Workload(_) => "WorkloadReconciler",
        }
    }

    fn api_version_and_kind(&self) -> (&'static str, &'static str) {
        match self {
            ChildRole::ProducerConfigMap | ChildRole::ConsumerConfigMap => ("v1", "ConfigMap"),
            ChildRole::ProducerSecret | ChildRole::ConsumerSecret => ("v1", "Secret"),
            ChildRole::Workload(kind) => (kind.api_version(), kind.kind()),
        }
    }

    /// Top-level fields copied from the desired child on update
    fn content_fields(&self) -> &'static [&'static str] {
        match self {
            ChildRole::ProducerConfigMap | ChildRole::ConsumerConfigMap => &["data"],
            ChildRole::ProducerSecret | ChildRole::ConsumerSecret => &["data", "type"],
            ChildRole::Workload(_) => &["spec"],
        }
    }

    fn key(&self, namespace: &str, name: &str) -> ObjectKey {
        let (api_version, kind) = self.api_version_and_kind();
        ObjectKey::new(api_version, kind, Some(namespace), name)
    }
}

/// The parent of the children being written
#[derive(Debug, Clone)]
pub struct ChildOwner {
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub owner_reference: OwnerReference,
}

impl ChildOwner {
    /// Owner data of a persisted resource; `None` if it has no name or uid yet
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(resource: &K) -> Option<Self> {
        Some(Self {
            namespace: resource.namespace().unwrap_or_default(),
            labels: resource.labels().clone(),
            owner_reference: resource.controller_owner_ref(&())?,
        })
    }

    fn controls(&self, obj: &DynamicObject) -> bool {
        obj.owner_references()
            .iter()
            .any(|r| r.controller == Some(true) && r.uid == self.owner_reference.uid)
    }

    fn metadata(&self, role: ChildRole, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()).filter(|l| !l.is_empty()),
            annotations: Some(BTreeMap::from([(
                RECONCILER_ANNOTATION.to_string(),
                role.annotation().to_string(),
            )])),
            owner_references: Some(vec![self.owner_reference.clone()]),
            ..ObjectMeta::default()
        }
    }
}

/// Desired ConfigMap or Secret child for a staged output
///
/// # Errors
///
/// Fails only if the typed object cannot be converted.
pub fn desired_data_child(
    owner: &ChildOwner,
    role: ChildRole,
    output: &StagedOutput,
) -> Result<DynamicObject, serde_json::Error> {
    let metadata = owner.metadata(role, &output.name);
    let value = match role {
        ChildRole::ProducerSecret | ChildRole::ConsumerSecret => {
            let data = output
                .data
                .iter()
                .map(|(k, v)| (k.clone(), ByteString(decode_staged(&output.name, k, v))))
                .collect();
            serde_json::to_value(Secret {
                metadata,
                data: Some(data),
                type_: Some("Opaque".to_string()),
                ..Secret::default()
            })?
        }
        _ => serde_json::to_value(ConfigMap {
            metadata,
            data: Some(output.data.clone()),
            ..ConfigMap::default()
        })?,
    };
    serde_json::from_value(value)
}

/// Staged secret values are base64; Kubernetes stores the decoded bytes.
fn decode_staged(secret: &str, key: &str, value: &str) -> Vec<u8> {
    general_purpose::STANDARD.decode(value).unwrap_or_else(|e| {
        warn!(
            "Value of {} in Secret {} is not valid base64 ({}), storing it verbatim",
            key, secret, e
        );
        value.as_bytes().to_vec()
    })
}

/// Converge a ConfigMap/Secret child onto `desired`.
///
/// A previously published child under `previous_name` is deleted when the
/// output disappears or is renamed. Returns the current child, if any.
///
/// # Errors
///
/// Store failures, conflicts that outlast the retries, and `NotOwned` when
/// an object with the target name belongs to someone else.
pub async fn reconcile_data_child(
    store: &dyn ObjectStore,
    owner: &ChildOwner,
    role: ChildRole,
    desired: Option<&StagedOutput>,
    previous_name: Option<&str>,
) -> Result<Option<DynamicObject>, StoreError> {
    if let Some(previous) = previous_name {
        if desired.is_none_or(|d| d.name != previous) {
            delete_child(store, owner, role, previous).await?;
        }
    }
    let Some(output) = desired else {
        return Ok(None);
    };
    let child = desired_data_child(owner, role, output)?;
    apply_child(store, owner, role, &child).await.map(Some)
}

/// Converge the workload child onto `desired`, labelled and owned like
/// every other child.
///
/// # Errors
///
/// See [`reconcile_data_child`].
pub async fn reconcile_workload_child(
    store: &dyn ObjectStore,
    owner: &ChildOwner,
    kind: WorkloadKind,
    mut desired: DynamicObject,
) -> Result<DynamicObject, StoreError> {
    let role = ChildRole::Workload(kind);
    let name = desired.name_any();
    let metadata = owner.metadata(role, &name);
    desired.metadata.namespace = metadata.namespace;
    desired.metadata.owner_references = metadata.owner_references;
    desired
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(owner.labels.clone());
    desired
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(metadata.annotations.unwrap_or_default());
    apply_child(store, owner, role, &desired).await
}

async fn apply_child(
    store: &dyn ObjectStore,
    owner: &ChildOwner,
    role: ChildRole,
    desired: &DynamicObject,
) -> Result<DynamicObject, StoreError> {
    let name = desired.name_any();
    let key = role.key(&owner.namespace, &name);

    match store.get(&key).await? {
        None => {
            info!("Creating {} for {}", key, owner.owner_reference.name);
            match store.create(&key, desired).await {
                Err(StoreError::AlreadyExists { .. }) => {}
                result => return result,
            }
        }
        Some(current) => {
            if !owner.controls(&current) {
                return Err(StoreError::NotOwned(key.to_string()));
            }
            if up_to_date(&current, desired, role) {
                return Ok(current);
            }
        }
    }

    let key = &key;
    retry_on_conflict(move || async move {
        let current = store.get(key).await?.ok_or_else(|| StoreError::NotFound {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
        if !owner.controls(&current) {
            return Err(StoreError::NotOwned(key.to_string()));
        }
        if up_to_date(&current, desired, role) {
            return Ok(current);
        }
        debug!("Updating {} for {}", key, owner.owner_reference.name);
        store.replace(key, &merged(&current, desired, role)).await
    })
    .await
}

async fn delete_child(
    store: &dyn ObjectStore,
    owner: &ChildOwner,
    role: ChildRole,
    name: &str,
) -> Result<(), StoreError> {
    let key = role.key(&owner.namespace, name);
    let Some(current) = store.get(&key).await? else {
        return Ok(());
    };
    let annotated = current
        .annotations()
        .get(RECONCILER_ANNOTATION)
        .is_some_and(|a| a == role.annotation());
    if !annotated || !owner.controls(&current) {
        debug!("Leaving {} in place, it is not managed by {}", key, role.annotation());
        return Ok(());
    }
    info!("Deleting {} for {}", key, owner.owner_reference.name);
    store.delete(&key).await
}

fn up_to_date(current: &DynamicObject, desired: &DynamicObject, role: ChildRole) -> bool {
    let labels_match = desired
        .labels()
        .iter()
        .all(|(k, v)| current.labels().get(k) == Some(v));
    let annotated = current
        .annotations()
        .get(RECONCILER_ANNOTATION)
        .is_some_and(|a| a == role.annotation());
    let annotations_match = desired
        .annotations()
        .iter()
        .all(|(k, v)| current.annotations().get(k) == Some(v));
    let content_matches = role
        .content_fields()
        .iter()
        .all(|field| current.data.get(*field) == desired.data.get(*field));
    labels_match && annotated && annotations_match && content_matches
}

/// `current` with labels, annotations and content taken from `desired`
fn merged(current: &DynamicObject, desired: &DynamicObject, role: ChildRole) -> DynamicObject {
    let mut updated = current.clone();
    updated
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(desired.labels().clone());
    updated
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(desired.annotations().clone());
    for field in role.content_fields() {
        match desired.data.get(*field) {
            Some(value) => updated.data[*field] = value.clone(),
            None => {
                if let Some(map) = updated.data.as_object_mut() {
                    map.remove(*field);
                }
            }
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::memory::MemoryStore;
    use serde_json::json;

    fn owner(uid: &str) -> ChildOwner {
        ChildOwner {
            namespace: "team-a".to_string(),
            labels: BTreeMap::from([("app".to_string(), "db".to_string())]),
            owner_reference: OwnerReference {
                api_version: "tensegrity.fastforge.io/v1alpha1".to_string(),
                kind: "Static".to_string(),
                name: "db".to_string(),
                uid: uid.to_string(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
        }
    }

    fn output(name: &str, data: &[(&str, &str)]) -> StagedOutput {
        StagedOutput {
            name: name.to_string(),
            data: data
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_secret_child_decodes_staged_values() {
        let child = desired_data_child(
            &owner("u1"),
            ChildRole::ProducerSecret,
            &output("db-produced", &[("token", "czNjcjN0")]),
        )
        .expect("convertible");
        // The wire format re-encodes the decoded bytes.
        assert_eq!(child.data["data"]["token"], json!("czNjcjN0"));
        assert_eq!(child.data["type"], json!("Opaque"));
        assert_eq!(
            child.annotations().get(RECONCILER_ANNOTATION).map(String::as_str),
            Some("ProducerSecretReconciler")
        );
        assert_eq!(child.owner_references()[0].uid, "u1");
    }

    #[tokio::test]
    async fn test_create_update_and_no_op() {
        let store = MemoryStore::new();
        let owner = owner("u1");
        let first = output("db-produced", &[("host", "10.0.0.1")]);

        let created = reconcile_data_child(&store, &owner, ChildRole::ProducerConfigMap, Some(&first), None)
            .await
            .expect("create")
            .expect("child");
        assert_eq!(created.data["data"]["host"], json!("10.0.0.1"));
        assert_eq!(store.write_count(), 1);

        reconcile_data_child(&store, &owner, ChildRole::ProducerConfigMap, Some(&first), Some("db-produced"))
            .await
            .expect("no-op");
        assert_eq!(store.write_count(), 1);

        let second = output("db-produced", &[("host", "10.0.0.2")]);
        store.inject_conflicts(1);
        let updated = reconcile_data_child(&store, &owner, ChildRole::ProducerConfigMap, Some(&second), Some("db-produced"))
            .await
            .expect("update")
            .expect("child");
        assert_eq!(updated.data["data"]["host"], json!("10.0.0.2"));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_absent_output_deletes_only_owned_child() {
        let store = MemoryStore::new();
        let ours = owner("u1");
        let staged = output("db-produced", &[("host", "10.0.0.1")]);
        reconcile_data_child(&store, &ours, ChildRole::ProducerConfigMap, Some(&staged), None)
            .await
            .expect("create");

        // A different owner never deletes our child.
        reconcile_data_child(&store, &owner("u2"), ChildRole::ProducerConfigMap, None, Some("db-produced"))
            .await
            .expect("skip");
        let key = ObjectKey::new("v1", "ConfigMap", Some("team-a"), "db-produced");
        assert!(store.get(&key).await.expect("get").is_some());

        reconcile_data_child(&store, &ours, ChildRole::ProducerConfigMap, None, Some("db-produced"))
            .await
            .expect("delete");
        assert!(store.get(&key).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_foreign_object_is_not_overwritten() {
        let store = MemoryStore::new();
        store.insert(
            serde_json::from_value(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": "db-produced", "namespace": "team-a" },
                "data": { "owner": "someone-else" }
            }))
            .expect("valid object"),
        );
        let err = reconcile_data_child(
            &store,
            &owner("u1"),
            ChildRole::ProducerConfigMap,
            Some(&output("db-produced", &[("host", "10.0.0.1")])),
            None,
        )
        .await
        .expect_err("foreign object");
        assert!(matches!(err, StoreError::NotOwned(_)));
    }
}
