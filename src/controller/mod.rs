//! # Controller
//!
//! Core controller modules for the Tensegrity controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: Key resolution, materialization and child objects
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
