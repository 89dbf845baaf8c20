//! # Custom Resource Definitions
//!
//! CRD types for the Tensegrity controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Produce/consume declarations and defaulting
//! - `status.rs` - Per-key outcomes and the resource status
//! - `conditions.rs` - Conditions and their set/remove rules
//! - `statics.rs` - The produce-only `Static` kind
//! - `deployment.rs` - The `Deployment` workload wrapper kind
//! - `statefulset.rs` - The `StatefulSet` workload wrapper kind
//! - `daemonset.rs` - The `DaemonSet` workload wrapper kind
//! - `resource.rs` - `HasTensegritySpec`, implemented by every kind

mod conditions;
mod daemonset;
mod deployment;
mod resource;
mod spec;
mod statefulset;
mod statics;
mod status;

pub use conditions::{
    keys_not_consumed_message, keys_not_produced_message, spec_invalid_message, Condition,
    ConditionStatus, ConditionType, KEYS_CONSUMED_MESSAGE, KEYS_CONSUMED_REASON,
    KEYS_NOT_CONSUMED_REASON, KEYS_NOT_PRODUCED_REASON, KEYS_PRODUCED_MESSAGE,
    KEYS_PRODUCED_REASON, SPEC_INVALID_REASON,
};
pub use daemonset::{TensegrityDaemonSet, TensegrityDaemonSetSpec};
pub use deployment::{TensegrityDeployment, TensegrityDeploymentSpec};
pub use resource::HasTensegritySpec;
pub use spec::{ConsumeSpec, ObjectReference, ProduceSpec, TensegritySpec};
pub use statefulset::{TensegrityStatefulSet, TensegrityStatefulSetSpec};
pub use statics::{Static, StaticSpec};
pub use status::{ConsumedKeyStatus, KeyStatus, ProducedKeyStatus, TensegrityStatus};
