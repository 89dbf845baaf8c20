//! # tensegrityctl
//!
//! Command-line interface for the Tensegrity controller.
//!
//! ## Usage
//!
//! ```bash
//! # Show produced/consumed keys and conditions of a resource
//! tensegrityctl status deployment billing --namespace team-a
//!
//! # Run the Sync pipeline offline against manifests on disk
//! tensegrityctl dry-run --resource billing.yaml --objects shared.yaml --objects team-a.yaml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;
use std::path::PathBuf;

mod dry_run;
mod status;

/// Tensegrity Controller CLI
#[derive(Parser)]
#[command(name = "tensegrityctl")]
#[command(
    about = "Tensegrity Controller CLI",
    long_about = None,
    after_help = "\
Available resource types:
  static (or 'st')          - Static resource
  deployment (or 'deploy')  - Tensegrity Deployment resource
  statefulset (or 'sts')    - Tensegrity StatefulSet resource
  daemonset (or 'ds')       - Tensegrity DaemonSet resource

Examples:
  tensegrityctl status static database --namespace shared
  tensegrityctl dry-run --resource billing.yaml --objects cluster.yaml
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the produced and consumed keys of a resource
    Status {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        /// Name of the resource
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Run the Sync pipeline offline and print the computed status and outputs
    #[command(name = "dry-run")]
    DryRun {
        /// Manifest of the Static or workload resource to sync
        #[arg(long, value_name = "FILE")]
        resource: PathBuf,

        /// Manifests of the objects the resource may read (multi-document YAML)
        #[arg(long, value_name = "FILE")]
        objects: Vec<PathBuf>,
    },
}

/// Resource types supported by tensegrityctl
#[derive(Clone, Copy, ValueEnum)]
enum ResourceType {
    #[value(name = "static", alias = "st")]
    Static,
    #[value(name = "deployment", alias = "deploy")]
    Deployment,
    #[value(name = "statefulset", alias = "sts")]
    StatefulSet,
    #[value(name = "daemonset", alias = "ds")]
    DaemonSet,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tensegrity=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status {
            resource_type,
            name,
        } => {
            // Required for rustls 0.23+ when no default provider is set via features
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                tracing::debug!("rustls crypto provider was already installed");
            }
            let client = Client::try_default()
                .await
                .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
            let namespace = cli.namespace.unwrap_or_else(|| "default".to_string());
            match resource_type {
                ResourceType::Static => {
                    status::status_command::<tensegrity::crd::Static>(client, &name, &namespace)
                        .await
                }
                ResourceType::Deployment => {
                    status::status_command::<tensegrity::crd::TensegrityDeployment>(
                        client, &name, &namespace,
                    )
                    .await
                }
                ResourceType::StatefulSet => {
                    status::status_command::<tensegrity::crd::TensegrityStatefulSet>(
                        client, &name, &namespace,
                    )
                    .await
                }
                ResourceType::DaemonSet => {
                    status::status_command::<tensegrity::crd::TensegrityDaemonSet>(
                        client, &name, &namespace,
                    )
                    .await
                }
            }
        }
        Commands::DryRun { resource, objects } => {
            dry_run::dry_run_command(&resource, &objects, cli.namespace.as_deref()).await
        }
    }
}
