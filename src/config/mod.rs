//! # Configuration
//!
//! Controller configuration loaded from environment variables.

mod controller;

pub use controller::{parse_tracked_kinds, ControllerConfig, LogFormat, TrackedKind};
