//! # Static
//!
//! Produce-only resource: publishes keys extracted from existing cluster
//! objects without owning a workload.

use super::resource::HasTensegritySpec;
use super::spec::TensegritySpec;
use super::status::TensegrityStatus;
use crate::controller::reconciler::workload::WorkloadKind;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Static Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: tensegrity.fastforge.io/v1alpha1
/// kind: Static
/// metadata:
///   name: database
///   namespace: shared
/// spec:
///   produces:
///     - key: host
///       apiVersion: v1
///       kind: Service
///       name: postgres
///       fieldPath: "{.spec.clusterIP}"
///     - key: password
///       apiVersion: v1
///       kind: Secret
///       name: postgres-auth
///       fieldPath: "{.data.password}"
///       sensitive: true
///       encoded: true
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Static",
    group = "tensegrity.fastforge.io",
    version = "v1alpha1",
    namespaced,
    status = "TensegrityStatus",
    printcolumn = r#"{"name":"Produced", "type":"string", "jsonPath":".status.produced"}"#,
    printcolumn = r#"{"name":"Produced Config Map", "type":"string", "jsonPath":".status.producedConfigMapName"}"#,
    printcolumn = r#"{"name":"Produced Secret", "type":"string", "jsonPath":".status.producedSecretName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StaticSpec {
    #[serde(flatten)]
    pub tensegrity: TensegritySpec,
}

impl HasTensegritySpec for Static {
    const CONSUMES: bool = false;
    const WORKLOAD: Option<WorkloadKind> = None;

    fn tensegrity_spec(&self) -> &TensegritySpec {
        &self.spec.tensegrity
    }

    fn tensegrity_status(&self) -> Option<&TensegrityStatus> {
        self.status.as_ref()
    }
}
