//! # StatefulSet
//!
//! Wrapper around an `apps/v1` StatefulSet spec, reconciled like the
//! `Deployment` wrapper: consumed keys are injected into the pod template
//! of the owned `apps/v1` StatefulSet.

use super::resource::HasTensegritySpec;
use super::spec::TensegritySpec;
use super::status::TensegrityStatus;
use crate::controller::reconciler::workload::{
    desired_stateful_set, PodTemplateInjection, WorkloadKind,
};
use k8s_openapi::api::apps::v1::StatefulSetSpec;
use kube::api::DynamicObject;
use kube::CustomResource;
use schemars::json_schema;
use serde::{Deserialize, Serialize};

/// StatefulSet Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: k8s.tensegrity.fastforge.io/v1alpha1
/// kind: StatefulSet
/// metadata:
///   name: ledger
///   namespace: team-a
/// spec:
///   consumes:
///     - apiVersion: tensegrity.fastforge.io/v1alpha1
///       kind: Static
///       name: database
///       maps:
///         DB_HOST: host
///   serviceName: ledger
///   selector:
///     matchLabels:
///       app: ledger
///   template:
///     metadata:
///       labels:
///         app: ledger
///     spec:
///       containers:
///         - name: ledger
///           image: ledger:2.1
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "StatefulSet",
    root = "TensegrityStatefulSet",
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
pub struct TensegrityStatefulSetSpec {
    #[serde(flatten)]
    #[schemars(schema_with = "stateful_set_spec_schema")]
    pub stateful_set: StatefulSetSpec,
    #[serde(flatten)]
    pub tensegrity: TensegritySpec,
}

fn stateful_set_spec_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

impl HasTensegritySpec for TensegrityStatefulSet {
    const CONSUMES: bool = true;
    const WORKLOAD: Option<WorkloadKind> = Some(WorkloadKind::StatefulSet);

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
        let child = desired_stateful_set(self, injection);
        serde_json::from_value(serde_json::to_value(child)?).map(Some)
    }
}
