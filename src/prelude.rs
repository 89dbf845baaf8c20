//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use tensegrity::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Static, TensegrityDeployment, TensegritySpec, etc.)
//! - Reconciler types (Reconciler, ReconcilerError, EngineConfig, etc.)
//! - Object store seam (ObjectStore, KubeObjectStore, MemoryStore)
//! - Config types (ControllerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, sync_resource, BackoffState, ConsumeSource, EngineConfig, KubeObjectStore,
    MemoryStore, ObjectKey, ObjectStore, Reconciler, ReconcilerError, StoreError, SyncOutcome,
    Tracker,
};

// Config types - for configuration management
pub use crate::config::ControllerConfig;
