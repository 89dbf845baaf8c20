//! # Workload Adapter
//!
//! Builds the `apps/v1` workload owned by a Tensegrity workload kind
//! (`Deployment`, `StatefulSet` or `DaemonSet`): the wrapped spec with the
//! consumed Secret and ConfigMap injected into every container through
//! `envFrom`. The children's resourceVersions are stamped on the pod
//! template so that a change in a consumed value rolls the pods.

use crate::constants::{CONSUMER_CONFIGMAP_VERSION_ANNOTATION, CONSUMER_SECRET_VERSION_ANNOTATION};
use crate::crd::{TensegrityDaemonSet, TensegrityDeployment, TensegrityStatefulSet};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, Container, EnvFromSource, PodTemplateSpec, SecretEnvSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

/// The `apps/v1` kind of a workload child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    #[must_use]
    pub fn api_version(&self) -> &'static str {
        "apps/v1"
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }
}

/// A consumed child to inject: its name and current resourceVersion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectedObject {
    pub name: String,
    pub resource_version: Option<String>,
}

/// Consumed children to inject into the pod template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodTemplateInjection {
    pub secret: Option<InjectedObject>,
    pub config_map: Option<InjectedObject>,
}

/// Desired `apps/v1` Deployment for `resource`
#[must_use]
pub fn desired_deployment(
    resource: &TensegrityDeployment,
    injection: &PodTemplateInjection,
) -> Deployment {
    let mut spec = resource.spec.deployment.clone();
    inject_pod_template(&mut spec.template, injection);
    Deployment {
        metadata: workload_metadata(resource),
        spec: Some(spec),
        status: None,
    }
}

/// Desired `apps/v1` StatefulSet for `resource`
#[must_use]
pub fn desired_stateful_set(
    resource: &TensegrityStatefulSet,
    injection: &PodTemplateInjection,
) -> StatefulSet {
    let mut spec = resource.spec.stateful_set.clone();
    inject_pod_template(&mut spec.template, injection);
    StatefulSet {
        metadata: workload_metadata(resource),
        spec: Some(spec),
        status: None,
    }
}

/// Desired `apps/v1` DaemonSet for `resource`
#[must_use]
pub fn desired_daemon_set(
    resource: &TensegrityDaemonSet,
    injection: &PodTemplateInjection,
) -> DaemonSet {
    let mut spec = resource.spec.daemon_set.clone();
    inject_pod_template(&mut spec.template, injection);
    DaemonSet {
        metadata: workload_metadata(resource),
        spec: Some(spec),
        status: None,
    }
}

/// The workload child shares the wrapper's name and namespace
fn workload_metadata<K: ResourceExt>(resource: &K) -> ObjectMeta {
    ObjectMeta {
        name: Some(resource.name_any()),
        namespace: resource.namespace(),
        ..ObjectMeta::default()
    }
}

/// Append the consumed sources to every container and stamp their versions
pub fn inject_pod_template(template: &mut PodTemplateSpec, injection: &PodTemplateInjection) {
    let env_from = env_from_sources(injection);
    if let Some(pod_spec) = template.spec.as_mut() {
        for container in &mut pod_spec.containers {
            inject(container, &env_from);
        }
        for container in pod_spec.init_containers.iter_mut().flatten() {
            inject(container, &env_from);
        }
    }

    let versions = [
        (CONSUMER_SECRET_VERSION_ANNOTATION, &injection.secret),
        (CONSUMER_CONFIGMAP_VERSION_ANNOTATION, &injection.config_map),
    ];
    for (annotation, injected) in versions {
        let Some(version) = injected.as_ref().and_then(|i| i.resource_version.clone()) else {
            continue;
        };
        template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(Default::default)
            .insert(annotation.to_string(), version);
    }
}

/// Secret first, then ConfigMap
fn env_from_sources(injection: &PodTemplateInjection) -> Vec<EnvFromSource> {
    let mut sources = Vec::new();
    if let Some(secret) = &injection.secret {
        sources.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret.name.clone(),
                optional: None,
            }),
            ..EnvFromSource::default()
        });
    }
    if let Some(config_map) = &injection.config_map {
        sources.push(EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: config_map.name.clone(),
                optional: None,
            }),
            ..EnvFromSource::default()
        });
    }
    sources
}

fn inject(container: &mut Container, sources: &[EnvFromSource]) {
    if sources.is_empty() {
        return;
    }
    container
        .env_from
        .get_or_insert_with(Vec::new)
        .extend(sources.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TensegrityDaemonSetSpec, TensegrityDeploymentSpec, TensegrityStatefulSetSpec};

    fn billing() -> TensegrityDeployment {
        let spec: TensegrityDeploymentSpec = serde_yaml::from_str(
            r"
selector:
  matchLabels:
    app: billing
template:
  metadata:
    labels:
      app: billing
  spec:
    initContainers:
      - name: migrate
        image: billing:1.0
    containers:
      - name: billing
        image: billing:1.0
        envFrom:
          - configMapRef:
              name: static-settings
consumes:
  - apiVersion: tensegrity.fastforge.io/v1alpha1
    kind: Static
    name: database
    maps:
      DB_HOST: host
",
        )
        .expect("valid spec");
        let mut resource = TensegrityDeployment::new("billing", spec);
        resource.metadata.namespace = Some("team-a".to_string());
        resource
    }

    fn injection() -> PodTemplateInjection {
        PodTemplateInjection {
            secret: Some(InjectedObject {
                name: "billing-consumed".to_string(),
                resource_version: Some("41".to_string()),
            }),
            config_map: Some(InjectedObject {
                name: "billing-consumed".to_string(),
                resource_version: Some("42".to_string()),
            }),
        }
    }

    #[test]
    fn test_env_from_appended_secret_first() {
        let deployment = desired_deployment(&billing(), &injection());
        let pod = deployment
            .spec
            .and_then(|s| s.template.spec)
            .expect("pod spec");

        let env_from = pod.containers[0].env_from.clone().unwrap_or_default();
        assert_eq!(env_from.len(), 3);
        assert!(env_from[0].config_map_ref.is_some());
        assert_eq!(
            env_from[1].secret_ref.as_ref().map(|s| s.name.as_str()),
            Some("billing-consumed")
        );
        assert!(env_from[2].config_map_ref.is_some());

        let init = pod.init_containers.unwrap_or_default();
        assert_eq!(init[0].env_from.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_version_annotations_on_template() {
        let deployment = desired_deployment(&billing(), &injection());
        assert_eq!(deployment.metadata.name.as_deref(), Some("billing"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("team-a"));

        let annotations = deployment
            .spec
            .and_then(|s| s.template.metadata)
            .and_then(|m| m.annotations)
            .unwrap_or_default();
        assert_eq!(
            annotations.get(CONSUMER_SECRET_VERSION_ANNOTATION).map(String::as_str),
            Some("41")
        );
        assert_eq!(
            annotations.get(CONSUMER_CONFIGMAP_VERSION_ANNOTATION).map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn test_nothing_consumed_leaves_template_untouched() {
        let resource = billing();
        let deployment = desired_deployment(&resource, &PodTemplateInjection::default());
        assert_eq!(deployment.spec, Some(resource.spec.deployment));
    }

    #[test]
    fn test_stateful_set_template_is_injected() {
        let spec: TensegrityStatefulSetSpec = serde_yaml::from_str(
            r"
serviceName: ledger
selector:
  matchLabels:
    app: ledger
template:
  metadata:
    labels:
      app: ledger
  spec:
    containers:
      - name: ledger
        image: ledger:2.1
delegates:
  - kind: Namespace
    name: shared
",
        )
        .expect("valid spec");
        assert_eq!(spec.tensegrity.delegates[0].name, "shared");
        let mut resource = TensegrityStatefulSet::new("ledger", spec);
        resource.metadata.namespace = Some("team-a".to_string());

        let child = desired_stateful_set(&resource, &injection());

        assert_eq!(child.metadata.name.as_deref(), Some("ledger"));
        let spec = child.spec.expect("spec");
        let labels = |template: &PodTemplateSpec| {
            template.metadata.as_ref().and_then(|m| m.labels.clone())
        };
        assert_eq!(labels(&spec.template), labels(&resource.spec.stateful_set.template));
        let env_from = spec
            .template
            .spec
            .and_then(|p| p.containers[0].env_from.clone())
            .unwrap_or_default();
        assert_eq!(env_from.len(), 2);
        assert!(env_from[0].secret_ref.is_some());
        let annotations = spec
            .template
            .metadata
            .and_then(|m| m.annotations)
            .unwrap_or_default();
        assert_eq!(
            annotations.get(CONSUMER_CONFIGMAP_VERSION_ANNOTATION).map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn test_daemon_set_keeps_its_own_fields() {
        let spec: TensegrityDaemonSetSpec = serde_yaml::from_str(
            r"
selector:
  matchLabels:
    app: agent
updateStrategy:
  type: OnDelete
template:
  metadata:
    labels:
      app: agent
  spec:
    containers:
      - name: agent
        image: agent:0.9
",
        )
        .expect("valid spec");
        let mut resource = TensegrityDaemonSet::new("agent", spec);
        resource.metadata.namespace = Some("team-a".to_string());

        let child = desired_daemon_set(&resource, &PodTemplateInjection::default());

        assert_eq!(child.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(child.spec, Some(resource.spec.daemon_set));
    }

    #[test]
    fn test_workload_kinds_are_apps_v1() {
        let kinds = [WorkloadKind::Deployment, WorkloadKind::StatefulSet, WorkloadKind::DaemonSet];
        let names: Vec<&str> = kinds.iter().map(WorkloadKind::kind).collect();
        assert_eq!(names, vec!["Deployment", "StatefulSet", "DaemonSet"]);
        assert!(kinds.iter().all(|k| k.api_version() == "apps/v1"));
    }
}
