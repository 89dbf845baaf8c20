//! # Deployment
//!
//! Wrapper around an `apps/v1` Deployment spec. The controller resolves the
//! wrapper's consumed keys, injects them into the pod template and owns the
//! resulting `apps/v1` Deployment.

use super::resource::HasTensegritySpec;
use super::spec::TensegritySpec;
use super::status::TensegrityStatus;
use crate::controller::reconciler::workload::{desired_deployment, PodTemplateInjection, WorkloadKind};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use kube::api::DynamicObject;
use kube::CustomResource;
use schemars::json_schema;
use serde::{Deserialize, Serialize};

/// Deployment Custom Resource Definition
///
/// The `apps/v1` DeploymentSpec fields and the Tensegrity fields share the
/// top level of `spec`.
///
/// # Example
///
/// ```yaml
/// apiVersion: k8s.tensegrity.fastforge.io/v1alpha1
/// kind: Deployment
/// metadata:
///   name: billing
///   namespace: team-a
/// spec:
///   delegates:
///     - kind: Namespace
///       name: shared
///   consumes:
///     - apiVersion: tensegrity.fastforge.io/v1alpha1
///       kind: Static
///       name: database
///       maps:
///         DB_HOST: host
///         DB_PASSWORD: password
///   selector:
///     matchLabels:
///       app: billing
///   template:
///     metadata:
///       labels:
///         app: billing
///     spec:
///       containers:
///         - name: billing
///           image: billing:1.0
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Deployment",
    root = "TensegrityDeployment",
    group = "k8s.tensegrity.fastforge.io",
    version = "v1alpha1",
    namespaced,
    status = "TensegrityStatus",
    printcolumn = r#"{"name":"Consumed", "type":"string", "jsonPath":".status.consumed"}"#,
    printcolumn = r#"{"name":"Produced", "type":"string", "jsonPath":".status.produced"}"#,
    printcolumn = r#"{"name":"Consumed Config Map", "type":"string", "jsonPath":".status.consumedConfigMapName"}"#,
    printcolumn = r#"{"name":"Consumed Secret", "type":"string", "jsonPath":".status.consumedSecretName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TensegrityDeploymentSpec {
    /// `apps/v1` DeploymentSpec of the owned workload
    #[serde(flatten)]
    #[schemars(schema_with = "deployment_spec_schema")]
    pub deployment: DeploymentSpec,
    #[serde(flatten)]
    pub tensegrity: TensegritySpec,
}

/// The embedded DeploymentSpec is validated by the apps/v1 API when the
/// child is written, so the CRD keeps its fields unpruned.
fn deployment_spec_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

impl HasTensegritySpec for TensegrityDeployment {
    const CONSUMES: bool = true;
    const WORKLOAD: Option<WorkloadKind> = Some(WorkloadKind::Deployment);

    fn tensegrity_spec(&self) -> &TensegritySpec {
        &self.spec.tensegrity
    }

    fn tensegrity_status(&self) -> Option<&TensegrityStatus> {
        self.status.as_ref()
    }

    fn desired_workload(
        &self,
        injection: &PodTemplateInjection,
    ) -> Result<Option<DynamicObject>, serde_json::Error> {
        let child = desired_deployment(self, injection);
        serde_json::from_value(serde_json::to_value(child)?).map(Some)
    }
}
