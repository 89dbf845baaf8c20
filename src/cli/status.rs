//! # Status Command
//!
//! Shows the produced and consumed keys and the conditions of a live resource.

use anyhow::{Context, Result};
use kube::{api::Api, Client, ResourceExt};
use tensegrity::crd::{HasTensegritySpec, TensegrityStatus};

/// Print the status of resource `name` of kind `K`
pub async fn status_command<K: HasTensegritySpec>(
    client: Client,
    name: &str,
    namespace: &str,
) -> Result<()> {
    let kind = K::kind(&());
    let api: Api<K> = Api::namespaced(client, namespace);
    let resource = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get {kind} '{namespace}/{name}'"))?;

    println!("Status for {kind} '{namespace}/{name}'");
    println!();
    println!("Resource Information:");
    println!("  Name: {}", resource.name_any());
    println!("  Namespace: {}", resource.namespace().unwrap_or_default());
    if let Some(generation) = resource.meta().generation {
        println!("  Generation: {generation}");
    }

    match resource.tensegrity_status() {
        Some(status) => print_status(status),
        None => {
            println!();
            println!("Status: No status available (resource may not have been reconciled yet)");
        }
    }
    Ok(())
}

fn print_status(status: &TensegrityStatus) {
    if let Some(observed_generation) = status.observed_generation {
        println!("  Observed Generation: {observed_generation}");
    }

    if let Some(produced) = status.produced {
        println!();
        println!("Produced: {}", produced.as_str());
        print_name("Config Map", status.produced_config_map_name.as_deref());
        print_name("Secret", status.produced_secret_name.as_deref());
        for key in &status.produced_keys {
            let value = if key.sensitive {
                "<sensitive>".to_string()
            } else {
                key.value.clone().unwrap_or_default()
            };
            println!(
                "  {:<24} {:<8} {}/{} {:<40} {}",
                key.key,
                key.status.as_str(),
                key.reference.kind,
                key.reference.name,
                value,
                key.reason.as_deref().unwrap_or("")
            );
        }
    }

    if let Some(consumed) = status.consumed {
        println!();
        println!("Consumed: {}", consumed.as_str());
        print_name("Config Map", status.consumed_config_map_name.as_deref());
        print_name("Secret", status.consumed_secret_name.as_deref());
        for key in &status.consumed_keys {
            let delegate = key
                .delegate
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_default();
            println!(
                "  {:<24} {:<8} {}/{}.{} via {:<16} {}",
                key.env,
                key.status.as_str(),
                key.reference.kind,
                key.reference.name,
                key.key,
                delegate,
                key.reason.as_deref().unwrap_or("")
            );
        }
    }

    if !status.conditions.is_empty() {
        println!();
        println!("Conditions:");
        for condition in &status.conditions {
            println!("  {:?}: {:?}", condition.condition_type, condition.status);
            println!("    Reason: {}", condition.reason);
            println!("    Message: {}", condition.message);
            println!("    Last Transition: {}", condition.last_transition_time);
        }
    }
}

fn print_name(label: &str, name: Option<&str>) {
    if let Some(name) = name {
        println!("  {label}: {name}");
    }
}
