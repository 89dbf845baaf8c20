//! # HasTensegritySpec
//!
//! The seam between concrete resource kinds and the engines: every kind
//! exposes its Tensegrity spec and status through this trait, and the
//! reconcile pipeline is written once against it.

use super::spec::TensegritySpec;
use super::status::TensegrityStatus;
use crate::controller::reconciler::workload::{PodTemplateInjection, WorkloadKind};
use kube::api::DynamicObject;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub trait HasTensegritySpec:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Whether the consumer engine runs for this kind
    const CONSUMES: bool;

    /// Kind of the workload child built by `desired_workload`, if any
    const WORKLOAD: Option<WorkloadKind>;

    fn tensegrity_spec(&self) -> &TensegritySpec;

    fn tensegrity_status(&self) -> Option<&TensegrityStatus>;

    /// Workload child with consumed keys injected into its pod template
    fn desired_workload(
        &self,
        _injection: &PodTemplateInjection,
    ) -> Result<Option<DynamicObject>, serde_json::Error> {
        Ok(None)
    }
}
