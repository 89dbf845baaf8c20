//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{ControllerConfig, LogFormat};
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::{KubeObjectStore, Reconciler, Tracker};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{Static, TensegrityDaemonSet, TensegrityDeployment, TensegrityStatefulSet};
use crate::observability;
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::ApiResource;
use kube::discovery::{self, Scope};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// A kind watched as `DynamicObject` to invalidate tracked reads
#[derive(Debug, Clone)]
pub struct WatchedKind {
    pub resource: ApiResource,
    pub namespaced: bool,
}

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Configuration the controller was started with
    pub config: ControllerConfig,
    /// Reconciler context shared by every kind
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Kinds whose changes re-trigger dependents through the tracker
    pub watched_kinds: Vec<WatchedKind>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("watched_kinds", &self.watched_kinds.len())
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber for the configured log format
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tensegrity=info".into());
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Kind registration and tracked-kind discovery
/// - Reconciler setup
///
/// # Errors
///
/// Server startup, client creation and metrics registration failures.
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let config = ControllerConfig::from_env();
    init_tracing(config.log_format);

    info!("Starting Tensegrity Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        require_delegates = config.require_delegates,
        consume_source = ?config.consume_source,
        default_namespace_delegate = config.default_namespace_delegate,
        "Engine configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let store = KubeObjectStore::new(client.clone());
    let mut watched_kinds = vec![
        WatchedKind {
            resource: ApiResource::erase::<Static>(&()),
            namespaced: true,
        },
        WatchedKind {
            resource: ApiResource::erase::<TensegrityDeployment>(&()),
            namespaced: true,
        },
        WatchedKind {
            resource: ApiResource::erase::<TensegrityStatefulSet>(&()),
            namespaced: true,
        },
        WatchedKind {
            resource: ApiResource::erase::<TensegrityDaemonSet>(&()),
            namespaced: true,
        },
    ];
    for watched in &watched_kinds {
        store.register(watched.resource.clone(), watched.namespaced);
    }
    store.register(ApiResource::erase::<ConfigMap>(&()), true);
    store.register(ApiResource::erase::<Secret>(&()), true);
    store.register(ApiResource::erase::<Deployment>(&()), true);
    store.register(ApiResource::erase::<StatefulSet>(&()), true);
    store.register(ApiResource::erase::<DaemonSet>(&()), true);
    store.register(ApiResource::erase::<Namespace>(&()), false);

    for tracked in &config.tracked_kinds {
        match discovery::pinned_kind(&client, &tracked.gvk()).await {
            Ok((resource, capabilities)) => {
                let namespaced = matches!(capabilities.scope, Scope::Namespaced);
                store.register(resource.clone(), namespaced);
                watched_kinds.push(WatchedKind {
                    resource,
                    namespaced,
                });
            }
            Err(e) => warn!(
                "Tracked kind {}/{} is not served, changes to it will only be seen on resync: {}",
                tracked.api_version(),
                tracked.kind,
                e
            ),
        }
    }

    let tracker = Arc::new(Tracker::new(config.tracker_lease_duration()));
    let reconciler = Arc::new(Reconciler::new(Arc::new(store), tracker, &config));

    info!("Controller initialized, starting watch loops...");

    Ok(InitializationResult {
        client,
        config,
        reconciler,
        server_state,
        watched_kinds,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
