//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::reconciler::{ConsumeSource, EngineConfig};
use kube::core::GroupVersionKind;
use std::time::Duration;
use tracing::warn;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// A kind whose objects invalidate tracked reads, e.g. `v1/ConfigMap` or `apps/v1/Deployment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl TrackedKind {
    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// `apiVersion` as it appears on objects of this kind
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Parse a comma-separated list of `version/Kind` or `group/version/Kind` entries.
///
/// Malformed entries are logged and skipped.
#[must_use]
pub fn parse_tracked_kinds(value: &str) -> Vec<TrackedKind> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('/').collect();
            match parts.as_slice() {
                [version, kind] if !version.is_empty() && !kind.is_empty() => Some(TrackedKind {
                    group: String::new(),
                    version: (*version).to_string(),
                    kind: (*kind).to_string(),
                }),
                [group, version, kind]
                    if !group.is_empty() && !version.is_empty() && !kind.is_empty() =>
                {
                    Some(TrackedKind {
                        group: (*group).to_string(),
                        version: (*version).to_string(),
                        kind: (*kind).to_string(),
                    })
                }
                _ => {
                    warn!(
                        "Ignoring tracked kind '{}' (expected v1/Kind or group/v1/Kind)",
                        entry
                    );
                    None
                }
            }
        })
        .collect()
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Port of the metrics and probes server
    pub metrics_port: u16,
    /// Maximum concurrent reconciliations per resource kind
    pub max_concurrent_reconciliations: u16,
    /// Fibonacci backoff floor after a failed reconcile (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling after a failed reconcile (seconds)
    pub backoff_max_secs: u64,
    /// Delay before restarting a watch stream that ended (seconds)
    pub watch_restart_delay_secs: u64,
    /// Lifetime of a dependency registered by a tracked read (seconds)
    pub tracker_lease_secs: u64,
    /// Requeue interval after a successful reconcile (seconds)
    pub resync_interval_secs: u64,
    /// Kinds watched to invalidate tracked reads
    pub tracked_kinds: Vec<TrackedKind>,
    /// Fail the consumer when `consumes` is set but `delegates` is empty
    pub require_delegates: bool,
    /// Where consumed values are read from
    pub consume_source: ConsumeSource,
    /// Prepend the resource's own namespace to its delegates
    pub default_namespace_delegate: bool,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            tracker_lease_secs: DEFAULT_TRACKER_LEASE_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            tracked_kinds: parse_tracked_kinds(DEFAULT_TRACKED_KINDS),
            require_delegates: false,
            consume_source: ConsumeSource::ProducerStatus,
            default_namespace_delegate: true,
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            tracker_lease_secs: env_var_or_default(
                "TRACKER_LEASE_SECS",
                DEFAULT_TRACKER_LEASE_SECS,
            ),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            tracked_kinds: parse_tracked_kinds(&env_var_or_default_str(
                "TRACKED_KINDS",
                DEFAULT_TRACKED_KINDS,
            )),
            require_delegates: env_var_or_default_bool("REQUIRE_DELEGATES", false),
            consume_source: env_var_or_default("CONSUME_SOURCE", ConsumeSource::ProducerStatus),
            default_namespace_delegate: env_var_or_default_bool(
                "DEFAULT_NAMESPACE_DELEGATE",
                true,
            ),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "json")),
        }
    }

    /// Engine flags derived from this configuration
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            require_delegates: self.require_delegates,
            consume_source: self.consume_source,
            default_namespace_delegate: self.default_namespace_delegate,
        }
    }

    /// Get tracker lease duration
    #[must_use]
    pub fn tracker_lease_duration(&self) -> Duration {
        Duration::from_secs(self.tracker_lease_secs)
    }

    /// Get periodic resync duration
    #[must_use]
    pub fn resync_interval_duration(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
