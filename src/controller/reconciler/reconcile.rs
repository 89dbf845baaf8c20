//! # Reconciliation Logic
//!
//! The Sync pipeline for one Tensegrity resource:
//!
//! 1. Default the spec (derived names, produce source names, namespace delegate)
//! 2. Validate it; an invalid spec only records the `Invalid` condition
//! 3. Consumer engine (kinds that consume)
//! 4. Producer engine
//! 5. Materializer
//! 6. Child objects: consumed ConfigMap/Secret, workload, produced ConfigMap/Secret
//! 7. Status write, skipped when nothing changed
//!
//! Steps 1-5 are side-effect free apart from reads and live in
//! [`sync_resource`], which the offline dry run reuses.

use super::children::{reconcile_data_child, reconcile_workload_child, ChildOwner, ChildRole};
use super::consumer::consume;
use super::materialize::{materialize, MaterializedOutputs, PipelineContext};
use super::producer::produce;
use super::retry::retry_on_conflict;
use super::store::{ObjectKey, ObjectStore, StoreError};
use super::tracker::Tracker;
use super::types::{EngineConfig, Reconciler, ReconcilerError};
use super::validation::{format_errors, validate_tensegrity_spec};
use super::workload::{InjectedObject, PodTemplateInjection};
use crate::crd::{
    spec_invalid_message, Condition, ConditionStatus, ConditionType, HasTensegritySpec,
    TensegritySpec, TensegrityStatus, SPEC_INVALID_REASON,
};
use crate::observability::metrics;
use kube::api::DynamicObject;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Result of running the engines over one resource
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The defaulted spec the engines ran against
    pub spec: TensegritySpec,
    pub status: TensegrityStatus,
    pub outputs: MaterializedOutputs,
    /// Validation errors, when the spec was rejected
    pub invalid: Option<String>,
}

/// Run the engines against current cluster state without writing anything.
///
/// The previous status is the starting point so conditions keep their
/// transition times across runs.
///
/// # Errors
///
/// Only the errors that abort a Sync; per-key failures end up in the status.
pub async fn sync_resource<K: HasTensegritySpec>(
    resource: &K,
    store: &dyn ObjectStore,
    tracker: &Tracker,
    engine: EngineConfig,
) -> Result<SyncOutcome, ReconcilerError> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let mut status = resource.tensegrity_status().cloned().unwrap_or_default();
    let spec = resource.tensegrity_spec().with_defaults(
        &name,
        &namespace,
        engine.default_namespace_delegate,
    );

    if let Err(errors) = validate_tensegrity_spec(&spec) {
        let message = format_errors(&errors);
        warn!("Spec of {}/{} is invalid: {}", namespace, name, message);
        status.set_condition(Condition::new(
            ConditionType::Invalid,
            ConditionStatus::True,
            SPEC_INVALID_REASON,
            spec_invalid_message(&message),
        ));
        return Ok(SyncOutcome {
            spec,
            status,
            outputs: MaterializedOutputs::default(),
            invalid: Some(message),
        });
    }
    status.remove_condition(ConditionType::Invalid);

    let mut ctx = PipelineContext::new(store, tracker, engine, ObjectKey::of(resource));
    if K::CONSUMES {
        consume(&mut ctx, &spec, &mut status).await?;
    }
    produce(&mut ctx, &spec, &mut status).await;
    let outputs = materialize(&ctx, &spec, &mut status);

    Ok(SyncOutcome {
        spec,
        status,
        outputs,
        invalid: None,
    })
}

/// Write the children of a valid outcome, then its status.
///
/// # Errors
///
/// Store failures that outlast conflict retries.
pub async fn apply_outcome<K: HasTensegritySpec>(
    resource: &K,
    store: &dyn ObjectStore,
    outcome: &SyncOutcome,
) -> Result<(), ReconcilerError> {
    let owner = ChildOwner::of(resource).ok_or(ReconcilerError::MissingMetadata)?;
    let previous = resource.tensegrity_status().cloned().unwrap_or_default();
    let outputs = &outcome.outputs;

    let consumer_config_map = reconcile_data_child(
        store,
        &owner,
        ChildRole::ConsumerConfigMap,
        outputs.consumer_config_map.as_ref(),
        previous.consumed_config_map_name.as_deref(),
    )
    .await?;
    let consumer_secret = reconcile_data_child(
        store,
        &owner,
        ChildRole::ConsumerSecret,
        outputs.consumer_secret.as_ref(),
        previous.consumed_secret_name.as_deref(),
    )
    .await?;

    if let Some(kind) = K::WORKLOAD {
        let injection = PodTemplateInjection {
            secret: consumer_secret.as_ref().map(injected),
            config_map: consumer_config_map.as_ref().map(injected),
        };
        if let Some(workload) = resource.desired_workload(&injection)? {
            reconcile_workload_child(store, &owner, kind, workload).await?;
        }
    }

    reconcile_data_child(
        store,
        &owner,
        ChildRole::ProducerConfigMap,
        outputs.producer_config_map.as_ref(),
        previous.produced_config_map_name.as_deref(),
    )
    .await?;
    reconcile_data_child(
        store,
        &owner,
        ChildRole::ProducerSecret,
        outputs.producer_secret.as_ref(),
        previous.produced_secret_name.as_deref(),
    )
    .await?;

    write_status(resource, store, &outcome.status).await
}

fn injected(child: &DynamicObject) -> InjectedObject {
    InjectedObject {
        name: child.name_any(),
        resource_version: child.resource_version(),
    }
}

/// Merge-patch `status` with `observedGeneration`, unless it equals the current status.
///
/// # Errors
///
/// Store failures that outlast conflict retries.
pub async fn write_status<K: HasTensegritySpec>(
    resource: &K,
    store: &dyn ObjectStore,
    status: &TensegrityStatus,
) -> Result<(), ReconcilerError> {
    let mut status = status.clone();
    status.observed_generation = resource.meta().generation;
    if resource.tensegrity_status() == Some(&status) {
        debug!("Status of {} is unchanged", resource.name_any());
        return Ok(());
    }

    let key = ObjectKey::of(resource);
    let patch = serde_json::to_value(&status)?;
    let (key, patch) = (&key, &patch);
    retry_on_conflict(move || async move {
        let current = store.get(key).await?.ok_or_else(|| StoreError::NotFound {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
        let resource_version = current.resource_version().unwrap_or_default();
        store.patch_status(key, &resource_version, patch).await
    })
    .await?;
    Ok(())
}

/// Reconcile one resource of kind `K`
///
/// Errors are handled by the error policy, which owns backoff.
///
/// # Errors
///
/// Validation failures (after recording the `Invalid` condition) and every
/// error that aborts a Sync.
pub async fn reconcile<K: HasTensegritySpec>(
    resource: Arc<K>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let kind = K::kind(&());
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let span = tracing::info_span!(
        "reconcile",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
    );
    reconcile_internal(resource, ctx, kind.as_ref())
        .instrument(span)
        .await
}

async fn reconcile_internal<K: HasTensegritySpec>(
    resource: Arc<K>,
    ctx: Arc<Reconciler>,
    kind: &str,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations(kind);
    debug!("Reconciling {} {}", kind, resource.name_any());

    let outcome = sync_resource(
        resource.as_ref(),
        ctx.store.as_ref(),
        ctx.tracker.as_ref(),
        ctx.engine,
    )
    .await?;

    if let Some(message) = outcome.invalid {
        write_status(resource.as_ref(), ctx.store.as_ref(), &outcome.status).await?;
        return Err(ReconcilerError::Validation(message));
    }

    apply_outcome(resource.as_ref(), ctx.store.as_ref(), &outcome).await?;

    let elapsed = start.elapsed();
    metrics::observe_reconciliation_duration(elapsed.as_secs_f64());
    info!(
        produced = outcome.status.produced.map(|s| s.as_str()),
        consumed = outcome.status.consumed.map(|s| s.as_str()),
        "Reconciled {} {} in {:?}",
        kind,
        resource.name_any(),
        elapsed
    );

    reset_backoff(&ctx, &backoff_key(kind, resource.as_ref()));
    Ok(Action::requeue(ctx.resync_interval))
}

/// Key of a resource's backoff state
#[must_use]
pub fn backoff_key<K: HasTensegritySpec>(kind: &str, resource: &K) -> String {
    format!(
        "{}/{}/{}",
        kind,
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    )
}

fn reset_backoff(ctx: &Reconciler, key: &str) {
    if let Some(state) = ctx
        .backoff_states
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get_mut(key)
    {
        state.reset();
    }
}
