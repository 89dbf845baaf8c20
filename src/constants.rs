//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the produce-only resource kinds
pub const TENSEGRITY_GROUP: &str = "tensegrity.fastforge.io";

/// API group of the workload wrapper kinds
pub const WORKLOAD_GROUP: &str = "k8s.tensegrity.fastforge.io";

/// Served version of every Tensegrity kind
pub const TENSEGRITY_VERSION: &str = "v1alpha1";

/// Field manager used for status writes
pub const FIELD_MANAGER: &str = "tensegrity-controller";

/// Suffix of the default ConfigMap/Secret names for produced keys
pub const PRODUCED_SUFFIX: &str = "produced";

/// Suffix of the default ConfigMap/Secret names for consumed keys
pub const CONSUMED_SUFFIX: &str = "consumed";

/// The only delegate kind the consumer knows how to search
pub const NAMESPACE_DELEGATE_KIND: &str = "Namespace";

/// Annotation marking which child writer owns a ConfigMap/Secret
pub const RECONCILER_ANNOTATION: &str = "reconciler";

/// Pod-template annotation carrying the consumed Secret's resourceVersion
pub const CONSUMER_SECRET_VERSION_ANNOTATION: &str = "tensegrity.fastforge.io/consumerSecretVersion";

/// Pod-template annotation carrying the consumed ConfigMap's resourceVersion
pub const CONSUMER_CONFIGMAP_VERSION_ANNOTATION: &str =
    "tensegrity.fastforge.io/consumerConfigMapVersion";

/// Reason recorded for consumed keys no delegate could satisfy
pub const CONSUMED_KEY_NOT_FOUND: &str = "consumed key by reference is not found";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default maximum concurrent reconciliations per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default Fibonacci backoff floor for failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff ceiling for failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting a watch stream that ended (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default lease of a dependency registered by a tracked read (seconds)
pub const DEFAULT_TRACKER_LEASE_SECS: u64 = 3600;

/// Default periodic resync interval after a successful reconcile (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default kinds watched for tracked-read invalidation
pub const DEFAULT_TRACKED_KINDS: &str = "v1/ConfigMap,v1/Secret,v1/Namespace,v1/Service";

/// Conflict retry: number of attempts for a single write
pub const CONFLICT_RETRY_STEPS: u32 = 5;

/// Conflict retry: delay before the first retry (milliseconds)
pub const CONFLICT_RETRY_INITIAL_DELAY_MS: u64 = 10;

/// Conflict retry: multiplier applied to the delay after each retry
pub const CONFLICT_RETRY_FACTOR: u32 = 2;
