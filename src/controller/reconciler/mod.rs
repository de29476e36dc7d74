//! # Reconciler
//!
//! Bootstrap reconciliation for the Universal Crossplane add-on.
//!
//! The reconciler keeps three objects in the bootstrapper's namespace in shape:
//! - reads the control plane token Secret (never written)
//! - maintains the identity ConfigMap with a control plane ID generated once
//! - maintains the gateway public certificates Secret from the Upbound API
//!
//! The Ready condition is surfaced as annotations on the identity ConfigMap.
//!
//! ## Reconciliation Flow
//!
//! 1. Observe the bootstrap objects
//! 2. Fetch certificates from the Upbound API when a token is present
//! 3. Diff observed against desired state
//! 4. Create missing objects, update drifted ones
//! 5. Return `Success`, `RequeueAfter` (transient) or `Failed` (fatal)

pub mod condition;
pub mod diff;
mod error_policy;
mod reconcile;
pub mod state;
pub mod types;

pub use condition::Condition;
pub use diff::Change;
pub use state::{DesiredState, ObservedState, UpstreamOutcome};
pub use types::{
    BackoffState, Phase, ReconcileError, ReconcileResult, Reconciler, ReconcilerSettings,
    TargetRef,
};
