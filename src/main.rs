//! # Tensegrity Controller
//!
//! A Kubernetes controller that wires configuration between workloads.
//!
//! ## Overview
//!
//! Resources declare the keys they **produce**, extracted by field path from
//! arbitrary cluster objects, and the keys they **consume** from other
//! producers. The controller:
//!
//! 1. **Resolves consumed keys** - searches the resource's delegate namespaces in order
//! 2. **Extracts produced keys** - reads source objects and evaluates field paths
//! 3. **Materializes** - plaintext keys to ConfigMaps, sensitive keys to Secrets
//! 4. **Injects** - consumed ConfigMap/Secret into the owned workload's pod template
//! 5. **Reports** - per-key results and `Produced`/`Consumed`/`Invalid` conditions
//!
//! ## Features
//!
//! - **Dependency tracking**: changes to any object read during a Sync re-trigger it
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use tensegrity::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
