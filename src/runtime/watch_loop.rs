//! # Watch Loop
//!
//! One controller per Tensegrity kind. Each controller watches its own kind,
//! the children it owns, and every tracked kind: a change to an object a
//! resource read during its last Sync re-enqueues that resource.

use crate::controller::reconciler::{reconcile, ObjectKey, Reconciler, Tracker};
use crate::controller::server::ServerState;
use crate::controller::reconciler::workload::WorkloadKind;
use crate::crd::{
    HasTensegritySpec, Static, TensegrityDaemonSet, TensegrityDeployment, TensegrityStatefulSet,
};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::initialization::{InitializationResult, WatchedKind};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DynamicObject};
use kube::Client;
use kube_runtime::controller::{Config as ControllerRunConfig, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run the watch loops of every kind until shutdown
///
/// # Errors
///
/// Never in practice; kept fallible for the caller's `?`.
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        config,
        reconciler,
        server_state,
        watched_kinds,
    } = init;

    // Mark server as not ready when SIGTERM/SIGINT is received
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_server_state.set_ready(false);
        }
    });

    let settings = LoopSettings {
        client,
        reconciler,
        server_state,
        watched_kinds: Arc::new(watched_kinds),
        concurrency: config.max_concurrent_reconciliations,
        restart_delay: config.watch_restart_delay_duration(),
    };

    futures::join!(
        run_kind_loop::<Static>(settings.clone()),
        run_kind_loop::<TensegrityDeployment>(settings.clone()),
        run_kind_loop::<TensegrityStatefulSet>(settings.clone()),
        run_kind_loop::<TensegrityDaemonSet>(settings),
    );

    info!("Controller stopped gracefully");
    Ok(())
}

#[derive(Clone)]
struct LoopSettings {
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    watched_kinds: Arc<Vec<WatchedKind>>,
    concurrency: u16,
    restart_delay: Duration,
}

/// Run the controller for `K`, restarting it whenever its stream ends
async fn run_kind_loop<K: HasTensegritySpec>(settings: LoopSettings) {
    let kind = K::kind(&()).to_string();
    loop {
        if !settings.server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        info!("Starting {} controller...", kind);
        build_controller::<K>(&settings)
            .shutdown_on_signal()
            .run(
                reconcile::<K>,
                handle_reconciliation_error::<K>,
                Arc::clone(&settings.reconciler),
            )
            .for_each(|result| {
                match result {
                    Ok((object, _action)) => debug!("Reconciled {}", object),
                    Err(e) => handle_watch_stream_error(&kind, &format!("{e:?}")),
                }
                futures::future::ready(())
            })
            .await;

        if !settings.server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        warn!(
            "{} controller stream ended, restarting in {} seconds...",
            kind,
            settings.restart_delay.as_secs()
        );
        tokio::time::sleep(settings.restart_delay).await;
    }
}

fn build_controller<K: HasTensegritySpec>(settings: &LoopSettings) -> Controller<K> {
    let client = &settings.client;
    let mut controller = Controller::new(
        Api::<K>::all(client.clone()),
        watcher::Config::default().any_semantic(),
    )
    .with_config(ControllerRunConfig::default().concurrency(settings.concurrency))
    .owns(Api::<ConfigMap>::all(client.clone()), watcher::Config::default())
    .owns(Api::<Secret>::all(client.clone()), watcher::Config::default());

    controller = match K::WORKLOAD {
        Some(WorkloadKind::Deployment) => controller.owns(
            Api::<Deployment>::all(client.clone()),
            watcher::Config::default(),
        ),
        Some(WorkloadKind::StatefulSet) => controller.owns(
            Api::<StatefulSet>::all(client.clone()),
            watcher::Config::default(),
        ),
        Some(WorkloadKind::DaemonSet) => controller.owns(
            Api::<DaemonSet>::all(client.clone()),
            watcher::Config::default(),
        ),
        None => controller,
    };

    for watched in settings.watched_kinds.iter() {
        let tracker = Arc::clone(&settings.reconciler.tracker);
        controller = controller.watches_with(
            Api::<DynamicObject>::all_with(client.clone(), &watched.resource),
            watched.resource.clone(),
            watcher::Config::default(),
            move |obj: DynamicObject| dependents_of::<K>(&tracker, &obj),
        );
    }
    controller
}

/// Resources of kind `K` that read `obj` during their last Sync
fn dependents_of<K: HasTensegritySpec>(tracker: &Tracker, obj: &DynamicObject) -> Vec<ObjectRef<K>> {
    let Some(key) = ObjectKey::of_dynamic(obj) else {
        return Vec::new();
    };
    let kind = K::kind(&());
    let api_version = K::api_version(&());
    tracker
        .dependents(&key)
        .into_iter()
        .filter(|dependent| dependent.kind == kind && dependent.api_version == api_version)
        .map(|dependent| {
            let reference = ObjectRef::new(&dependent.name);
            match dependent.namespace.as_deref() {
                Some(ns) => reference.within(ns),
                None => reference,
            }
        })
        .collect()
}
