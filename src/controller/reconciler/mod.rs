//! # Reconciler
//!
//! Key resolution and materialization for Tensegrity resources.
//!
//! The reconciler:
//! - Watches `Static` and the workload wrapper kinds across all namespaces
//! - Resolves consumed keys from producers through the resource's delegates
//! - Extracts produced keys from arbitrary source objects by field path
//! - Materializes both sides into owned ConfigMaps and Secrets
//! - Reports per-key results and `Consumed`/`Produced`/`Invalid` conditions
//!
//! ## Reconciliation Flow
//!
//! 1. Default and validate the spec
//! 2. Consumer engine (delegates outer, consumed references inner)
//! 3. Producer engine (fail-closed)
//! 4. Materializer (plaintext to ConfigMaps, sensitive to Secrets)
//! 5. Child objects and workload
//! 6. Status

pub mod children;
pub mod consumer;
pub mod extract;
pub mod materialize;
pub mod memory;
pub mod producer;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod types;
pub mod validation;
pub mod workload;

// Re-export public API
pub use extract::{extract, ExtractError, FieldPath};
pub use materialize::{KeyBuckets, MaterializedOutputs, PipelineContext, StagedOutput};
pub use memory::MemoryStore;
pub use reconcile::{apply_outcome, backoff_key, reconcile, sync_resource, SyncOutcome};
pub use store::{KubeObjectStore, ObjectKey, ObjectStore, StoreError};
pub use tracker::Tracker;
pub use types::{BackoffState, ConsumeSource, EngineConfig, Reconciler, ReconcilerError};
pub use workload::{InjectedObject, PodTemplateInjection};
