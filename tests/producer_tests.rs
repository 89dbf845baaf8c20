//! Producer engine and materializer against an in-memory cluster

mod common;

use common::{
    config_map_data, data, object, produce, reconcile_once, reload, secret, secret_data,
    sensitive, service, static_resource, tracker, update,
};
use tensegrity::controller::reconciler::{
    EngineConfig, MemoryStore, ObjectKey, ObjectStore, ReconcilerError, StoreError,
};
use tensegrity::crd::{
    ConditionStatus, ConditionType, HasTensegritySpec, KeyStatus, ProduceSpec, Static,
    KEYS_NOT_PRODUCED_REASON, KEYS_PRODUCED_MESSAGE, KEYS_PRODUCED_REASON,
};

fn database_produces() -> Vec<ProduceSpec> {
    vec![
        produce("host", "Service", "db", "{.spec.clusterIP}"),
        produce("port", "Service", "db", "{.spec.ports[0].port}"),
        sensitive(produce("password", "Secret", "db-creds", "{.data.password}"), true),
    ]
}

/// Sources in `team-a` and the `database` Static reading them
async fn seed_database(store: &MemoryStore) -> Static {
    store.insert(service("team-a", "db", "10.0.0.1"));
    store.insert(secret("team-a", "db-creds", &[("password", "s3cret")]));
    common::seed(store, &static_resource("team-a", "database", database_produces())).await
}

#[tokio::test]
async fn test_all_keys_produced() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let database = seed_database(&store).await;

    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");

    assert_eq!(
        config_map_data(&store, "team-a", "database-produced").await,
        Some(data(&[("host", "10.0.0.1"), ("port", "5432")]))
    );
    assert_eq!(
        secret_data(&store, "team-a", "database-produced").await,
        Some(data(&[("password", "s3cret")]))
    );

    let status = reload(&store, &database)
        .await
        .tensegrity_status()
        .cloned()
        .expect("status");
    assert_eq!(status.produced, Some(KeyStatus::Success));
    assert_eq!(status.produced_config_map_name.as_deref(), Some("database-produced"));
    assert_eq!(status.produced_secret_name.as_deref(), Some("database-produced"));
    assert_eq!(status.consumed, None);

    let password = &status.produced_keys[2];
    assert!(password.sensitive);
    assert_eq!(password.value, None);
    assert_eq!(password.reference.namespace, "team-a");
    assert!(!password.reference.uid.is_empty());
    assert_eq!(status.produced_keys[0].value.as_deref(), Some("10.0.0.1"));

    let condition = status.condition(ConditionType::Produced).expect("condition");
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, KEYS_PRODUCED_REASON);
    assert_eq!(condition.message, KEYS_PRODUCED_MESSAGE);
}

#[tokio::test]
async fn test_one_failing_key_withholds_every_output() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let database = seed_database(&store).await;
    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");

    let database = update(&store, &database, |d| {
        d.spec
            .tensegrity
            .produces
            .push(produce("replica", "Service", "db", "{.spec.missing}"));
    })
    .await;
    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");

    assert_eq!(config_map_data(&store, "team-a", "database-produced").await, None);
    assert_eq!(secret_data(&store, "team-a", "database-produced").await, None);

    let status = reload(&store, &database)
        .await
        .tensegrity_status()
        .cloned()
        .expect("status");
    assert_eq!(status.produced, Some(KeyStatus::Failure));
    assert_eq!(status.produced_config_map_name, None);
    assert_eq!(status.produced_secret_name, None);

    let statuses: Vec<KeyStatus> = status.produced_keys.iter().map(|k| k.status).collect();
    assert_eq!(
        statuses,
        vec![KeyStatus::Success, KeyStatus::Success, KeyStatus::Success, KeyStatus::Failure]
    );
    assert!(status.produced_keys[3]
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("missing")));

    let condition = status.condition(ConditionType::Produced).expect("condition");
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, KEYS_NOT_PRODUCED_REASON);
    assert_eq!(condition.message, "Keys are not produced: replica.");
}

#[tokio::test]
async fn test_missing_source_is_a_key_failure() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let gateway = common::seed(
        &store,
        &static_resource(
            "team-a",
            "gateway",
            vec![sensitive(produce("apiKey", "Secret", "api-creds", "{.data.key}"), true)],
        ),
    )
    .await;

    let outcome = reconcile_once(&store, &tracker, &gateway, EngineConfig::default())
        .await
        .expect("reconcile");

    let key = &outcome.status.produced_keys[0];
    assert_eq!(key.status, KeyStatus::Failure);
    assert_eq!(key.reason.as_deref(), Some("Secret \"api-creds\" not found"));
    assert!(outcome.outputs.producer_secret.is_none());
    assert_eq!(outcome.status.produced_secret_name, None);
    assert_eq!(secret_data(&store, "team-a", "gateway-produced").await, None);
}

#[tokio::test]
async fn test_sensitive_plain_value_is_encoded_once() {
    let store = MemoryStore::new();
    let tracker = tracker();
    store.insert(object(serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "settings", "namespace": "team-a" },
        "data": { "token": "abc", "region": "eu-west-1" },
    })));
    let settings = common::seed(
        &store,
        &static_resource(
            "team-a",
            "settings",
            vec![
                sensitive(produce("token", "ConfigMap", "settings", "{.data.token}"), false),
                produce("region", "ConfigMap", "settings", "{.data.region}"),
            ],
        ),
    )
    .await;

    let outcome = reconcile_once(&store, &tracker, &settings, EngineConfig::default())
        .await
        .expect("reconcile");

    let staged = outcome.outputs.producer_secret.expect("staged secret");
    assert_eq!(staged.data, data(&[("token", "YWJj")]));
    assert_eq!(
        secret_data(&store, "team-a", "settings-produced").await,
        Some(data(&[("token", "abc")]))
    );
    assert_eq!(
        config_map_data(&store, "team-a", "settings-produced").await,
        Some(data(&[("region", "eu-west-1")]))
    );
}

#[tokio::test]
async fn test_placeholder_source_and_default_name() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let mut placeholder = produce("literal", "", "", "{.metadata.name}");
    placeholder.reference.api_version = String::new();
    assert!(placeholder.is_placeholder());
    let resource =
        common::seed(&store, &static_resource("team-a", "literal", vec![placeholder])).await;

    let outcome = reconcile_once(&store, &tracker, &resource, EngineConfig::default())
        .await
        .expect("reconcile");

    // The placeholder is an empty object, so every path misses.
    let key = &outcome.status.produced_keys[0];
    assert_eq!(key.status, KeyStatus::Failure);
    assert_eq!(key.reference.name, "literal");
    assert_eq!(outcome.spec.produces[0].reference.name, "literal");
}

#[tokio::test]
async fn test_source_change_rewrites_child_through_conflicts() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let database = seed_database(&store).await;
    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");

    let service_key = ObjectKey::new("v1", "Service", Some("team-a"), "db");
    store
        .replace(&service_key, &service("team-a", "db", "10.0.0.2"))
        .await
        .expect("replace service");
    assert_eq!(
        tracker.dependents(&service_key),
        vec![ObjectKey::of(&database)]
    );

    store.inject_conflicts(2);
    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile despite conflicts");

    assert_eq!(
        config_map_data(&store, "team-a", "database-produced").await,
        Some(data(&[("host", "10.0.0.2"), ("port", "5432")]))
    );
    let status = reload(&store, &database)
        .await
        .tensegrity_status()
        .cloned()
        .expect("status");
    assert_eq!(status.produced_keys[0].value.as_deref(), Some("10.0.0.2"));
}

#[tokio::test]
async fn test_foreign_child_is_never_overwritten() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let database = seed_database(&store).await;
    store.insert(object(serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "database-produced", "namespace": "team-a" },
        "data": { "owner": "someone-else" },
    })));

    let result = reconcile_once(&store, &tracker, &database, EngineConfig::default()).await;

    assert!(matches!(
        result,
        Err(ReconcilerError::Store(StoreError::NotOwned(_)))
    ));
    assert_eq!(
        config_map_data(&store, "team-a", "database-produced").await,
        Some(data(&[("owner", "someone-else")]))
    );
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let store = MemoryStore::new();
    let tracker = tracker();
    let database = seed_database(&store).await;

    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");
    let writes = store.write_count();
    let first = reload(&store, &database).await;

    reconcile_once(&store, &tracker, &database, EngineConfig::default())
        .await
        .expect("reconcile");
    let second = reload(&store, &database).await;

    assert_eq!(store.write_count(), writes);
    assert_eq!(
        serde_json::to_value(first.tensegrity_status()).expect("serializable"),
        serde_json::to_value(second.tensegrity_status()).expect("serializable")
    );
}
