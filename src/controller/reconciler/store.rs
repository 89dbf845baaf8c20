//! # Object Store
//!
//! The engines read and write cluster objects through `ObjectStore`, keyed
//! by apiVersion, kind, namespace and name. `KubeObjectStore` talks to the
//! API server; `MemoryStore` backs tests and offline dry runs.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::discovery::{self, Scope};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Identity of an object in the store. Cluster-scoped objects have no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Key of a typed resource
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self::new(
            &K::api_version(&()),
            &K::kind(&()),
            obj.meta().namespace.as_deref(),
            &obj.name_any(),
        )
    }

    /// Key of a dynamic object, if it carries its type information
    #[must_use]
    pub fn of_dynamic(obj: &DynamicObject) -> Option<Self> {
        let types = obj.types.as_ref()?;
        Some(Self::new(
            &types.api_version,
            &types.kind,
            obj.metadata.namespace.as_deref(),
            &obj.name_any(),
        ))
    }

    /// Group/version/kind parsed from `api_version`
    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        match self.api_version.split_once('/') {
            Some((group, version)) => GroupVersionKind::gvk(group, version, &self.kind),
            None => GroupVersionKind::gvk("", &self.api_version, &self.kind),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("Operation cannot be fulfilled on {0}: the object has been modified")]
    Conflict(String),
    #[error("{0} exists but is not managed by this resource")]
    NotOwned(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    fn from_kube(err: kube::Error, key: &ObjectKey) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists {
                    kind: key.kind.clone(),
                    name: key.name.clone(),
                }
            }
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(key.to_string()),
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
                kind: key.kind.clone(),
                name: key.name.clone(),
            },
            other => StoreError::Kube(other),
        }
    }
}

/// Read/write access to cluster objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Absence is `Ok(None)`, not an error.
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError>;

    async fn create(&self, key: &ObjectKey, obj: &DynamicObject)
        -> Result<DynamicObject, StoreError>;

    /// Replace an object. `obj.metadata.resourceVersion` is the precondition.
    async fn replace(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Merge-patch the status subresource under a resourceVersion precondition.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &serde_json::Value,
    ) -> Result<DynamicObject, StoreError>;
}

/// `ObjectStore` backed by the Kubernetes API
///
/// Kinds are resolved through discovery once and cached.
pub struct KubeObjectStore {
    client: Client,
    resources: Mutex<HashMap<String, (ApiResource, bool)>>,
}

impl fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Register a kind whose `ApiResource` is known without discovery
    pub fn register(&self, resource: ApiResource, namespaced: bool) {
        let key = format!("{}/{}", resource.api_version, resource.kind);
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (resource, namespaced));
    }

    async fn resolve(&self, key: &ObjectKey) -> Result<(ApiResource, bool), StoreError> {
        let cache_key = format!("{}/{}", key.api_version, key.kind);
        if let Some(found) = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            return Ok(found.clone());
        }

        let (resource, capabilities) = discovery::pinned_kind(&self.client, &key.gvk())
            .await
            .map_err(|e| StoreError::from_kube(e, key))?;
        let namespaced = matches!(capabilities.scope, Scope::Namespaced);
        debug!(
            "Discovered {} (plural {}, namespaced {})",
            cache_key, resource.plural, namespaced
        );
        self.register(resource.clone(), namespaced);
        Ok((resource, namespaced))
    }

    async fn api(&self, key: &ObjectKey) -> Result<Api<DynamicObject>, StoreError> {
        let (resource, namespaced) = self.resolve(key).await?;
        Ok(match (&key.namespace, namespaced) {
            (Some(ns), true) => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        })
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        let api = match self.api(key).await {
            Ok(api) => api,
            // An unserved kind cannot have any objects.
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        api.get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, key))
    }

    async fn create(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.api(key)
            .await?
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, key))
    }

    async fn replace(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.api(key)
            .await?
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, key))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        match self
            .api(key)
            .await?
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from_kube(e, key) {
                StoreError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &serde_json::Value,
    ) -> Result<DynamicObject, StoreError> {
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        self.api(key)
            .await?
            .patch_status(
                &key.name,
                &status_patch_params(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(e, key))
    }
}

/// Merge-patch parameters for status writes, attributed to the controller
fn status_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(crate::constants::FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_patch_params_name_the_field_manager() {
        let params = status_patch_params();
        assert_eq!(params.field_manager.as_deref(), Some(crate::constants::FIELD_MANAGER));
        assert!(!params.force);
        assert!(!params.dry_run);
    }

    #[test]
    fn test_gvk_from_core_and_grouped_api_versions() {
        let core = ObjectKey::new("v1", "Secret", Some("ns"), "creds");
        let gvk = core.gvk();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");

        let grouped = ObjectKey::new("tensegrity.fastforge.io/v1alpha1", "Static", None, "db");
        let gvk = grouped.gvk();
        assert_eq!(gvk.group, "tensegrity.fastforge.io");
        assert_eq!(gvk.version, "v1alpha1");
        assert_eq!(gvk.kind, "Static");
    }

    #[test]
    fn test_empty_namespace_is_cluster_scoped() {
        let key = ObjectKey::new("v1", "Namespace", Some(""), "team-a");
        assert_eq!(key.namespace, None);
        assert_eq!(key.to_string(), "Namespace/team-a");
    }

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound {
            kind: "Secret".to_string(),
            name: "api-creds".to_string(),
        };
        assert_eq!(err.to_string(), "Secret \"api-creds\" not found");
    }
}
