//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{backoff_key, BackoffState, Reconciler, ReconcilerError};
use crate::crd::HasTensegritySpec;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource to avoid cross-resource interference,
/// and reset by the reconciler after the next success.
pub fn handle_reconciliation_error<K: HasTensegritySpec>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let kind = K::kind(&());
    let resource_key = backoff_key(&kind, obj.as_ref());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource = %resource_key,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", resource_key, error);
    observability::metrics::increment_reconciliation_errors(&kind);

    let (backoff_seconds, error_count) = {
        let mut states = ctx
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(resource_key)
            .or_insert_with(|| BackoffState::new(ctx.backoff_min_secs, ctx.backoff_max_secs));
        state.increment_error();
        (state.backoff.next_backoff_seconds(), state.error_count)
    };

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Classification of a failed watch stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// The watched kind is not served (CRD missing)
    NotFound,
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old, the watcher relists on its own
    Expired,
    /// API server throttling or storage re-initializing
    Throttled,
    Other,
}

/// Classify a watch stream error from its rendered form.
///
/// 404 is checked before 401, as 404 errors may contain "WatchFailed" in the error chain.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorClass::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorClass::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorClass::Throttled;
    }
    WatchErrorClass::Other
}

/// Log a failed controller stream event for `kind`
pub fn handle_watch_stream_error(kind: &str, error_string: &str) {
    match classify_watch_error(error_string) {
        WatchErrorClass::NotFound => {
            error!(
                "Watch for {} failed: kind not found. Are the CRDs installed? {}",
                kind, error_string
            );
        }
        WatchErrorClass::Unauthorized => {
            error!(
                "Watch for {} failed authentication (401 Unauthorized), RBAC may have been revoked: {}",
                kind, error_string
            );
        }
        WatchErrorClass::Expired => {
            info!("Watch for {} resource version expired, relisting", kind);
        }
        WatchErrorClass::Throttled => {
            warn!("Watch for {} throttled by the API server: {}", kind, error_string);
        }
        WatchErrorClass::Other => {
            warn!("Controller stream error for {}: {}", kind, error_string);
        }
    }
}
