//! # Types
//!
//! Core types for the reconciler.

use super::store::{ObjectStore, StoreError};
use super::tracker::Tracker;
use crate::controller::backoff::FibonacciBackoff;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a whole Sync. Per-key failures never surface here.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Spec is invalid: {0}")]
    Validation(String),
    #[error("unsupported delegate kind: {0}")]
    UnsupportedDelegateKind(String),
    #[error("consumes is set but no delegates are configured")]
    MissingDelegates,
    #[error("resource has no name or uid")]
    MissingMetadata,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where the consumer engine reads resolved values from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeSource {
    /// The producer's `status.producedKeys`, re-extracting sensitive keys live
    #[default]
    ProducerStatus,
    /// The producer's materialized ConfigMap and Secret
    PublishedObjects,
}

impl FromStr for ConsumeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "status" | "producerstatus" => Ok(ConsumeSource::ProducerStatus),
            "objects" | "publishedobjects" => Ok(ConsumeSource::PublishedObjects),
            other => Err(format!("unknown consume source '{other}'")),
        }
    }
}

/// Behavioral flags of the engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Non-empty `consumes` with empty `delegates` aborts the Sync
    pub require_delegates: bool,
    pub consume_source: ConsumeSource,
    /// Prepend the resource's own namespace to its delegates
    pub default_namespace_delegate: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            require_delegates: false,
            consume_source: ConsumeSource::ProducerStatus,
            default_namespace_delegate: true,
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconcile context handed to every reconciliation
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub tracker: Arc<Tracker>,
    pub engine: EngineConfig,
    /// Requeue interval after a successful reconcile
    pub resync_interval: Duration,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    // Backoff state per resource (identified by kind/namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("engine", &self.engine)
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        tracker: Arc<Tracker>,
        config: &crate::config::ControllerConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            engine: config.engine_config(),
            resync_interval: config.resync_interval_duration(),
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_source_from_str() {
        assert_eq!("status".parse(), Ok(ConsumeSource::ProducerStatus));
        assert_eq!("Objects".parse(), Ok(ConsumeSource::PublishedObjects));
        assert!("live".parse::<ConsumeSource>().is_err());
    }

    #[test]
    fn test_backoff_state_reset() {
        let mut state = BackoffState::new(5, 300);
        state.increment_error();
        state.backoff.next_backoff_seconds();
        state.reset();
        assert_eq!(state.error_count, 0);
        assert_eq!(state.backoff.next_backoff_seconds(), 5);
    }
}
