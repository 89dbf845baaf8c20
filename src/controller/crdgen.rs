//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML for the
//! `Static` kind and the `Deployment`, `StatefulSet` and `DaemonSet`
//! workload kinds.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/tensegrity.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use tensegrity::crd::{Static, TensegrityDaemonSet, TensegrityDeployment, TensegrityStatefulSet};

fn main() {
    let crds = [
        Static::crd(),
        TensegrityDeployment::crd(),
        TensegrityStatefulSet::crd(),
        TensegrityDaemonSet::crd(),
    ];

    // Print header comments warning that this file should not be edited manually
    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("#");
    for crd in crds {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
