//! # Universal Crossplane Bootstrapper
//!
//! Kubernetes controller that installs and maintains the resources Universal
//! Crossplane needs in its namespace:
//!
//! 1. **Control plane identity**: a ConfigMap holding a generated control plane ID,
//!    kept stable once written
//! 2. **Gateway certificates**: a Secret with the public certificates of the Upbound
//!    gateway, fetched with the control plane token
//! 3. **Bootstrap condition**: readiness, reason and message annotations on the
//!    identity ConfigMap
//!
//! The reconciler is level-triggered and idempotent. It runs on watch events of the
//! bootstrap objects and at least once per sync period.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod observability;
pub mod runtime;
pub mod upbound;

pub use error::{Stage, StartupError};
