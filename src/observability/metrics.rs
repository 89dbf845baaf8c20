//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `tensegrity_reconciliations_total{kind}` - Total number of reconciliations
//! - `tensegrity_reconciliation_errors_total{kind}` - Total number of reconciliation errors
//! - `tensegrity_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `tensegrity_produced_keys_total{status}` - Produced key outcomes
//! - `tensegrity_consumed_keys_total{status}` - Consumed env outcomes
//! - `tensegrity_write_conflicts_total` - Optimistic-concurrency conflicts retried

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tensegrity_reconciliations_total",
            "Total number of reconciliations by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tensegrity_reconciliation_errors_total",
            "Total number of reconciliation errors by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "tensegrity_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PRODUCED_KEYS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tensegrity_produced_keys_total",
            "Total number of produced key outcomes by status",
        ),
        &["status"],
    )
    .expect("Failed to create PRODUCED_KEYS_TOTAL metric - this should never happen")
});

static CONSUMED_KEYS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tensegrity_consumed_keys_total",
            "Total number of consumed env outcomes by status",
        ),
        &["status"],
    )
    .expect("Failed to create CONSUMED_KEYS_TOTAL metric - this should never happen")
});

static WRITE_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tensegrity_write_conflicts_total",
        "Total number of write conflicts retried",
    )
    .expect("Failed to create WRITE_CONFLICTS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PRODUCED_KEYS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONSUMED_KEYS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WRITE_CONFLICTS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_produced_key(success: bool) {
    PRODUCED_KEYS_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
}

pub fn record_consumed_key(success: bool) {
    CONSUMED_KEYS_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
}

pub fn increment_write_conflicts() {
    WRITE_CONFLICTS_TOTAL.inc();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}
