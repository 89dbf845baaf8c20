//! # Pipeline Context and Value Materializer
//!
//! `PipelineContext` carries the per-reconciliation state between the
//! consumer, producer and materializer stages: store access with
//! watch-on-read tracking, engine flags, and the staged key buckets.
//!
//! The materializer turns the staged buckets into named outputs for the
//! child-object writers and records the output names in status. An empty
//! bucket yields no output and clears the corresponding status name.

use super::store::{ObjectKey, ObjectStore, StoreError};
use super::tracker::Tracker;
use super::types::EngineConfig;
use crate::crd::{TensegritySpec, TensegrityStatus};
use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::BTreeMap;

/// Resolved values split by sensitivity. Sensitive values are base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuckets {
    pub plaintext: BTreeMap<String, String>,
    pub sensitive: BTreeMap<String, String>,
}

impl KeyBuckets {
    pub fn clear(&mut self) {
        self.plaintext.clear();
        self.sensitive.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plaintext.is_empty() && self.sensitive.is_empty()
    }
}

/// State threaded through one reconciliation of one resource
pub struct PipelineContext<'a> {
    store: &'a dyn ObjectStore,
    tracker: &'a Tracker,
    pub config: EngineConfig,
    /// The resource being reconciled
    pub dependent: ObjectKey,
    pub consumed: KeyBuckets,
    pub produced: KeyBuckets,
}

impl std::fmt::Debug for PipelineContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("dependent", &self.dependent)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> PipelineContext<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn ObjectStore,
        tracker: &'a Tracker,
        config: EngineConfig,
        dependent: ObjectKey,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
            dependent,
            consumed: KeyBuckets::default(),
            produced: KeyBuckets::default(),
        }
    }

    /// Namespace of the resource being reconciled
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.dependent.namespace.as_deref().unwrap_or_default()
    }

    /// Fetch an object and register the reconciled resource as its dependent
    ///
    /// # Errors
    ///
    /// Propagates store failures. A missing object is `Ok(None)`.
    pub async fn tracked_get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        self.tracker.track(key, &self.dependent);
        self.store.get(key).await
    }
}

/// A key/value object to be written by a child reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedOutput {
    pub name: String,
    pub data: BTreeMap<String, String>,
}

/// Staged outputs of one reconciliation. Secret data is base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedOutputs {
    pub consumer_config_map: Option<StagedOutput>,
    pub consumer_secret: Option<StagedOutput>,
    pub producer_config_map: Option<StagedOutput>,
    pub producer_secret: Option<StagedOutput>,
}

fn stage(name: &str, data: &BTreeMap<String, String>) -> Option<StagedOutput> {
    (!data.is_empty()).then(|| StagedOutput {
        name: name.to_string(),
        data: data.clone(),
    })
}

/// Stage the context buckets under the names from the defaulted `spec`
/// and record those names in `status`.
pub fn materialize(
    ctx: &PipelineContext<'_>,
    spec: &TensegritySpec,
    status: &mut TensegrityStatus,
) -> MaterializedOutputs {
    let outputs = MaterializedOutputs {
        consumer_config_map: stage(&spec.consumes_config_map_name, &ctx.consumed.plaintext),
        consumer_secret: stage(&spec.consumes_secret_name, &ctx.consumed.sensitive),
        producer_config_map: stage(&spec.produces_config_map_name, &ctx.produced.plaintext),
        producer_secret: stage(&spec.produces_secret_name, &ctx.produced.sensitive),
    };

    let name_of = |output: &Option<StagedOutput>| output.as_ref().map(|o| o.name.clone());
    status.consumed_config_map_name = name_of(&outputs.consumer_config_map);
    status.consumed_secret_name = name_of(&outputs.consumer_secret);
    status.produced_config_map_name = name_of(&outputs.producer_config_map);
    status.produced_secret_name = name_of(&outputs.producer_secret);

    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::memory::MemoryStore;
    use std::time::Duration;

    #[test]
    fn test_empty_buckets_clear_outputs_and_names() {
        let store = MemoryStore::new();
        let tracker = Tracker::new(Duration::from_secs(60));
        let mut ctx = PipelineContext::new(
            &store,
            &tracker,
            EngineConfig::default(),
            ObjectKey::new("tensegrity.fastforge.io/v1alpha1", "Static", Some("team-a"), "db"),
        );
        ctx.produced
            .plaintext
            .insert("host".to_string(), "10.0.0.1".to_string());

        let spec = TensegritySpec::default().with_defaults("db", "team-a", true);
        let mut status = TensegrityStatus {
            produced_secret_name: Some("stale".to_string()),
            ..TensegrityStatus::default()
        };
        let outputs = materialize(&ctx, &spec, &mut status);

        assert_eq!(
            outputs.producer_config_map.map(|o| o.name),
            Some("db-produced".to_string())
        );
        assert!(outputs.producer_secret.is_none());
        assert!(outputs.consumer_config_map.is_none());
        assert_eq!(status.produced_config_map_name.as_deref(), Some("db-produced"));
        assert_eq!(status.produced_secret_name, None);
        assert_eq!(status.consumed_config_map_name, None);
    }

    #[tokio::test]
    async fn test_tracked_get_registers_dependency() {
        let store = MemoryStore::new();
        let tracker = Tracker::new(Duration::from_secs(60));
        let dependent =
            ObjectKey::new("tensegrity.fastforge.io/v1alpha1", "Static", Some("team-a"), "db");
        let ctx = PipelineContext::new(&store, &tracker, EngineConfig::default(), dependent.clone());
        assert_eq!(ctx.namespace(), "team-a");

        let secret = ObjectKey::new("v1", "Secret", Some("team-a"), "creds");
        assert!(ctx.tracked_get(&secret).await.expect("store").is_none());
        assert_eq!(tracker.dependents(&secret), vec![dependent]);
    }
}
