//! # Controller
//!
//! Core controller modules for the bootstrapper.
//!
//! - `backoff`: Exponential backoff for transient failures
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
