//! # Memory Store
//!
//! In-process `ObjectStore` with API-server write semantics: resourceVersion
//! preconditions, conflicts, uid assignment and merge-patched status. Used by
//! the integration tests and by `tensegrityctl dry-run`.

use super::store::{ObjectKey, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    version: u64,
    pending_conflicts: u32,
    writes: u64,
}

impl MemoryState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Consume one injected conflict, if any are pending
    fn take_conflict(&mut self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::Conflict(key.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object as-is, assigning a resourceVersion and uid when missing.
    ///
    /// Objects without `apiVersion`/`kind` are ignored and `None` is returned.
    pub fn insert(&self, mut obj: DynamicObject) -> Option<ObjectKey> {
        let key = ObjectKey::of_dynamic(&obj)?;
        let mut state = self.state();
        if obj.metadata.resource_version.is_none() {
            obj.metadata.resource_version = Some(state.next_version());
        }
        if obj.metadata.uid.is_none() {
            obj.metadata.uid = Some(format!("uid-{}", state.version));
        }
        state.objects.insert(key.clone(), obj);
        Some(key)
    }

    /// Fail the next `count` writes with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.state().pending_conflicts = count;
    }

    /// Number of successful writes so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state().writes
    }

    /// Snapshot of every stored object
    #[must_use]
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.state().objects.values().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        let state = self.state();
        if let Some(obj) = state.objects.get(key) {
            return Ok(Some(obj.clone()));
        }
        // Cluster-scoped kinds are found regardless of the requested namespace.
        if key.namespace.is_some() {
            let cluster_key = ObjectKey {
                namespace: None,
                ..key.clone()
            };
            return Ok(state.objects.get(&cluster_key).cloned());
        }
        Ok(None)
    }

    async fn create(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        if state.objects.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                kind: key.kind.clone(),
                name: key.name.clone(),
            });
        }
        state.take_conflict(key)?;

        let mut created = obj.clone();
        created.metadata.name = Some(key.name.clone());
        created.metadata.namespace.clone_from(&key.namespace);
        created.metadata.resource_version = Some(state.next_version());
        created.metadata.uid = Some(format!("uid-{}", state.version));
        state.objects.insert(key.clone(), created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn replace(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        let current = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: key.kind.clone(),
                name: key.name.clone(),
            })?;
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(StoreError::Conflict(key.to_string()));
        }
        state.take_conflict(key)?;

        let mut replaced = obj.clone();
        replaced.metadata.uid.clone_from(&current.metadata.uid);
        replaced.metadata.resource_version = Some(state.next_version());
        // Status is only written through the status subresource.
        match current.data.get("status") {
            Some(status) => replaced.data["status"] = status.clone(),
            None => {
                if let Value::Object(map) = &mut replaced.data {
                    map.remove("status");
                }
            }
        }
        state.objects.insert(key.clone(), replaced.clone());
        state.writes += 1;
        Ok(replaced)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.objects.remove(key).is_some() {
            state.writes += 1;
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &Value,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        let mut current = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: key.kind.clone(),
                name: key.name.clone(),
            })?;
        if current.metadata.resource_version.as_deref() != Some(resource_version) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        state.take_conflict(key)?;

        if !current.data.is_object() {
            current.data = Value::Object(serde_json::Map::new());
        }
        let target = current
            .data
            .as_object_mut()
            .map(|map| map.entry("status").or_insert(Value::Null));
        if let Some(target) = target {
            merge_patch(target, status);
        }
        current.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key.clone(), current.clone());
        state.writes += 1;
        Ok(current)
    }
}

/// Apply a JSON merge patch (RFC 7386): `null` removes, objects merge, everything else replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
