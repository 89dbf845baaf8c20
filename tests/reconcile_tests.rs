//! Full reconciliations through the controller entry points

mod common;

use common::{produce, reload, service, static_resource, update};
use kube::CustomResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tensegrity::config::ControllerConfig;
use tensegrity::controller::reconciler::{reconcile, MemoryStore, Reconciler, ReconcilerError};
use tensegrity::crd::{
    ConditionStatus, ConditionType, HasTensegritySpec, KeyStatus, Static, TensegrityDaemonSet,
    TensegrityDeployment, TensegrityStatefulSet, SPEC_INVALID_REASON,
};
use tensegrity::runtime::error_policy::handle_reconciliation_error;

fn reconciler(store: Arc<MemoryStore>) -> Arc<Reconciler> {
    let config = ControllerConfig::default();
    Arc::new(Reconciler::new(store, Arc::new(common::tracker()), &config))
}

#[tokio::test]
async fn test_invalid_spec_is_reported_then_cleared() {
    let store = Arc::new(MemoryStore::new());
    let ctx = reconciler(Arc::clone(&store));
    store.insert(service("team-a", "db", "10.0.0.1"));
    let database = common::seed(
        &store,
        &static_resource(
            "team-a",
            "database",
            vec![produce("db host", "Service", "db", "{.spec.clusterIP}")],
        ),
    )
    .await;

    let message = match reconcile(Arc::new(database.clone()), Arc::clone(&ctx)).await {
        Err(ReconcilerError::Validation(message)) => message,
        other => panic!("expected a validation error, got {other:?}"),
    };
    assert!(message.starts_with("spec.produces[0].key: Invalid value: \"db host\""));

    let status = reload(&store, &database)
        .await
        .tensegrity_status()
        .cloned()
        .expect("status");
    let invalid = status.condition(ConditionType::Invalid).expect("invalid condition");
    assert_eq!(invalid.status, ConditionStatus::True);
    assert_eq!(invalid.reason, SPEC_INVALID_REASON);
    assert_eq!(invalid.message, format!("Spec is invalid: {message}."));
    assert_eq!(status.produced, None);

    let database = update(&store, &database, |d| {
        d.spec.tensegrity.produces[0].key = "host".to_string();
    })
    .await;
    let action = reconcile(Arc::new(database.clone()), ctx)
        .await
        .expect("reconcile");
    assert_eq!(action, Action::requeue(Duration::from_secs(300)));

    let status = reload(&store, &database)
        .await
        .tensegrity_status()
        .cloned()
        .expect("status");
    assert!(status.condition(ConditionType::Invalid).is_none());
    assert_eq!(status.produced, Some(KeyStatus::Success));
}

#[tokio::test]
async fn test_errors_back_off_until_success() {
    let store = Arc::new(MemoryStore::new());
    let ctx = reconciler(Arc::clone(&store));
    let database = common::seed(
        &store,
        &static_resource(
            "team-a",
            "database",
            vec![produce("host", "Service", "db", "{.spec.clusterIP}")],
        ),
    )
    .await;
    let database = Arc::new(database);
    let error = ReconcilerError::Validation("broken".to_string());

    let delays: Vec<Action> = (0..4)
        .map(|_| handle_reconciliation_error(Arc::clone(&database), &error, Arc::clone(&ctx)))
        .collect();
    assert_eq!(
        delays,
        [5, 5, 10, 15]
            .map(|s| Action::requeue(Duration::from_secs(s)))
            .to_vec()
    );

    // A missing source is a key failure, so the reconcile itself succeeds.
    reconcile(Arc::clone(&database), Arc::clone(&ctx))
        .await
        .expect("reconcile");
    assert_eq!(
        handle_reconciliation_error(database, &error, ctx),
        Action::requeue(Duration::from_secs(5))
    );
}

#[test]
fn test_crds_are_namespaced_in_their_groups() {
    let statics = Static::crd();
    assert_eq!(statics.spec.group, "tensegrity.fastforge.io");
    assert_eq!(statics.spec.names.kind, "Static");
    assert_eq!(statics.spec.scope, "Namespaced");

    let deployments = TensegrityDeployment::crd();
    assert_eq!(deployments.spec.group, "k8s.tensegrity.fastforge.io");
    assert_eq!(deployments.spec.names.kind, "Deployment");
    assert_eq!(deployments.spec.versions[0].name, "v1alpha1");
    assert!(deployments.spec.versions[0]
        .subresources
        .as_ref()
        .is_some_and(|s| s.status.is_some()));

    for (crd, kind) in [
        (TensegrityStatefulSet::crd(), "StatefulSet"),
        (TensegrityDaemonSet::crd(), "DaemonSet"),
    ] {
        assert_eq!(crd.spec.group, "k8s.tensegrity.fastforge.io");
        assert_eq!(crd.spec.names.kind, kind);
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
