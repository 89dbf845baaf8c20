//! # DaemonSet
//!
//! Wrapper around an `apps/v1` DaemonSet spec owning the resulting
//! `apps/v1` DaemonSet.

use super::resource::HasTensegritySpec;
use super::spec::TensegritySpec;
use super::status::TensegrityStatus;
use crate::controller::reconciler::workload::{
    desired_daemon_set, PodTemplateInjection, WorkloadKind,
};
use k8s_openapi::api::apps::v1::DaemonSetSpec;
use kube::api::DynamicObject;
use kube::CustomResource;
use schemars::json_schema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "DaemonSet",
    root = "TensegrityDaemonSet",
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
pub struct TensegrityDaemonSetSpec {
    #[serde(flatten)]
    #[schemars(schema_with = "daemon_set_spec_schema")]
    pub daemon_set: DaemonSetSpec,
    #[serde(flatten)]
    pub tensegrity: TensegritySpec,
}

fn daemon_set_spec_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

impl HasTensegritySpec for TensegrityDaemonSet {
    const CONSUMES: bool = true;
    const WORKLOAD: Option<WorkloadKind> = Some(WorkloadKind::DaemonSet);

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
        let child = desired_daemon_set(self, injection);
        serde_json::from_value(serde_json::to_value(child)?).map(Some)
    }
}
