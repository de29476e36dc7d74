//! # Runtime
//!
//! Hosts the bootstrap controller: dispatch loop, work queue, manager lifecycle
//! and signal handling.

pub mod controller;
pub mod initialization;
pub mod manager;
pub mod queue;
pub mod signal;

pub use controller::{Controller, Reconcile, Runnable};
pub use initialization::{BOOTSTRAP_CONTROLLER, assemble, bootstrap_controller, run};
pub use manager::{Manager, ManagerError};
pub use queue::WorkQueue;
