//! # Validation
//!
//! Validates a defaulted `TensegritySpec` before the engines run. Errors are
//! reported per field in the same `path: Type value: detail` shape the API
//! server uses, so they read naturally in the `Invalid` condition.

use super::extract::FieldPath;
use crate::constants::NAMESPACE_DELEGATE_KIND;
use crate::crd::{ObjectReference, TensegritySpec};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

// ConfigMap and Secret key format
static CONFIG_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-._a-zA-Z0-9]+$")
        .expect("Failed to compile CONFIG_KEY_REGEX - this should never happen")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorType {
    Required(&'static str),
    Duplicate(String),
    Invalid(String, &'static str),
}

/// A validation failure on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub error: FieldErrorType,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            FieldErrorType::Required(detail) => {
                write!(f, "{}: Required value: {}", self.path, detail)
            }
            FieldErrorType::Duplicate(value) => {
                write!(f, "{}: Duplicate value: {:?}", self.path, value)
            }
            FieldErrorType::Invalid(value, detail) => {
                write!(f, "{}: Invalid value: {:?}: {}", self.path, value, detail)
            }
        }
    }
}

/// Join field errors into a single message
#[must_use]
pub fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate produces, consumes and delegates of a defaulted spec.
///
/// # Errors
///
/// Returns every field error found.
pub fn validate_tensegrity_spec(spec: &TensegritySpec) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    validate_produces(spec, &mut errors);
    validate_consumes(spec, &mut errors);
    validate_delegates(spec, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn required(errors: &mut Vec<FieldError>, path: String, detail: &'static str) {
    errors.push(FieldError {
        path,
        error: FieldErrorType::Required(detail),
    });
}

fn validate_produces(spec: &TensegritySpec, errors: &mut Vec<FieldError>) {
    let mut seen_keys = HashSet::new();
    for (i, produce) in spec.produces.iter().enumerate() {
        let path = format!("spec.produces[{i}]");
        let reference = &produce.reference;

        if produce.key.is_empty() {
            required(errors, format!("{path}.key"), "valid key name");
        } else if !CONFIG_KEY_REGEX.is_match(&produce.key) {
            errors.push(FieldError {
                path: format!("{path}.key"),
                error: FieldErrorType::Invalid(
                    produce.key.clone(),
                    "must consist of alphanumeric characters, '-', '_' or '.'",
                ),
            });
        }
        if !seen_keys.insert(produce.key.as_str()) {
            errors.push(FieldError {
                path: format!("{path}.key"),
                error: FieldErrorType::Duplicate(produce.key.clone()),
            });
        }

        // Both empty selects the placeholder source; only one empty is a mistake.
        if reference.api_version.is_empty() && !reference.kind.is_empty() {
            required(errors, format!("{path}.apiVersion"), "valid resource api version");
        }
        if reference.kind.is_empty() && !reference.api_version.is_empty() {
            required(errors, format!("{path}.kind"), "valid resource kind");
        }
        if reference.name.is_empty() {
            required(errors, format!("{path}.name"), "valid resource name");
        }
        if reference.field_path.is_empty() {
            required(errors, format!("{path}.fieldPath"), "valid resource JSONPath");
        } else if FieldPath::parse(&reference.field_path).is_err() {
            errors.push(FieldError {
                path: format!("{path}.fieldPath"),
                error: FieldErrorType::Invalid(
                    reference.field_path.clone(),
                    "valid resource JSONPath",
                ),
            });
        }
        if produce.encoded && !produce.sensitive {
            errors.push(FieldError {
                path: format!("{path}.encoded"),
                error: FieldErrorType::Invalid(
                    "true".to_string(),
                    "encoded is only valid when sensitive is true",
                ),
            });
        }
    }
}

fn validate_consumes(spec: &TensegritySpec, errors: &mut Vec<FieldError>) {
    let mut seen_envs = HashSet::new();
    let mut seen_refs: HashSet<&ObjectReference> = HashSet::new();
    for (i, consume) in spec.consumes.iter().enumerate() {
        let path = format!("spec.consumes[{i}]");
        let reference = &consume.reference;

        if reference.api_version.is_empty() {
            required(errors, format!("{path}.apiVersion"), "valid resource api version");
        }
        if reference.kind.is_empty() {
            required(errors, format!("{path}.kind"), "valid resource kind");
        }
        if reference.name.is_empty() {
            required(errors, format!("{path}.name"), "valid resource name");
        }
        if consume.maps.is_empty() {
            required(
                errors,
                format!("{path}.maps"),
                "valid environment variables to keys mapping",
            );
        }
        if !seen_refs.insert(reference) {
            errors.push(FieldError {
                path: path.clone(),
                error: FieldErrorType::Duplicate(format!(
                    "{}/{} {}",
                    reference.api_version, reference.kind, reference.name
                )),
            });
        }
        for (env, key) in &consume.maps {
            if !CONFIG_KEY_REGEX.is_match(env) {
                errors.push(FieldError {
                    path: format!("{path}.maps"),
                    error: FieldErrorType::Invalid(
                        env.clone(),
                        "must consist of alphanumeric characters, '-', '_' or '.'",
                    ),
                });
            }
            if key.is_empty() {
                required(errors, format!("{path}.maps[{env}]"), "valid key name");
            }
            if !seen_envs.insert(env.as_str()) {
                errors.push(FieldError {
                    path: format!("{path}.maps"),
                    error: FieldErrorType::Duplicate(env.clone()),
                });
            }
        }
    }
}

fn validate_delegates(spec: &TensegritySpec, errors: &mut Vec<FieldError>) {
    let mut seen: HashSet<&ObjectReference> = HashSet::new();
    for (i, delegate) in spec.delegates.iter().enumerate() {
        let path = format!("spec.delegates[{i}]");
        if delegate.kind.is_empty() {
            required(errors, format!("{path}.kind"), "valid resource kind");
        } else if delegate.kind != NAMESPACE_DELEGATE_KIND {
            errors.push(FieldError {
                path: format!("{path}.kind"),
                error: FieldErrorType::Invalid(
                    delegate.kind.clone(),
                    "kind must be one of these values: Namespace",
                ),
            });
        }
        if delegate.name.is_empty() {
            required(errors, format!("{path}.name"), "valid resource name");
        }
        if !seen.insert(delegate) {
            errors.push(FieldError {
                path,
                error: FieldErrorType::Duplicate(format!("{} {}", delegate.kind, delegate.name)),
            });
        }
    }
}
