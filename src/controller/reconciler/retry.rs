//! # Conflict Retry
//!
//! Retries a single write that lost an optimistic-concurrency race. The
//! operation is re-run from scratch so it can re-read the current object.

use super::store::StoreError;
use crate::constants::{
    CONFLICT_RETRY_FACTOR, CONFLICT_RETRY_INITIAL_DELAY_MS, CONFLICT_RETRY_STEPS,
};
use crate::observability::metrics;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Run `op`, retrying on `StoreError::Conflict` with exponential backoff.
///
/// At most `CONFLICT_RETRY_STEPS` attempts are made; the last conflict is returned.
///
/// # Errors
///
/// Returns the first non-conflict error, or the conflict of the final attempt.
pub async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = Duration::from_millis(CONFLICT_RETRY_INITIAL_DELAY_MS);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < CONFLICT_RETRY_STEPS => {
                metrics::increment_write_conflicts();
                debug!("Write conflict (attempt {}), retrying in {:?}: {}", attempt, delay, e);
                tokio::time::sleep(delay).await;
                delay *= CONFLICT_RETRY_FACTOR;
                attempt += 1;
            }
            result => return result,
        }
    }
}
