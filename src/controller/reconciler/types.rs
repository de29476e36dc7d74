//! # Types
//!
//! Core types for the reconciler.

use crate::cluster::{ClusterApi, ClusterError};
use crate::config::{BootstrapOptions, ControllerConfig};
use crate::constants::{IDENTITY_CONFIG_MAP, MIN_BACKOFF_MS};
use crate::controller::backoff::ExponentialBackoff;
use crate::upbound::{ApiError, UpstreamApi};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Identity of a reconciliation target; the scheduler's queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetRef {
    pub namespace: String,
    pub name: String,
}

impl TargetRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The bootstrap resource set of `namespace`, keyed by its identity ConfigMap
    #[must_use]
    pub fn bootstrap(namespace: &str) -> Self {
        Self::new(namespace, IDENTITY_CONFIG_MAP)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("cluster API: {0}")]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Upstream(#[from] ApiError),

    #[error("target {0} is outside the watched namespace")]
    OutOfScope(String),

    #[error("reconciliation task failed: {0}")]
    TaskFailed(String),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Whether a faster retry than the sync period is warranted
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cluster(e) => e.is_transient(),
            Self::Upstream(e) => e.is_transient(),
            Self::OutOfScope(_) | Self::TaskFailed(_) | Self::Cancelled => false,
        }
    }

    /// Short classification used for requeue metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Cluster(e) => e.reason(),
            Self::Upstream(e) => e.outcome(),
            Self::OutOfScope(_) => "out_of_scope",
            Self::TaskFailed(_) => "task_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one reconciliation pass, consumed immediately by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Desired state reached; next pass at the sync period
    Success,
    /// Transient failure; retry after the given delay
    RequeueAfter(Duration),
    /// Terminal failure for this pass; next pass at the sync period
    Failed(ReconcileError),
}

/// Per-target lifecycle, tracked for observability
///
/// `Idle -> Reconciling -> {Success, Requeue, Failed}`; terminal phases return to
/// `Idle` when the next pass is picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Reconciling,
    Success,
    Requeue,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Reconciling => "Reconciling",
            Self::Success => "Success",
            Self::Requeue => "Requeue",
            Self::Failed => "Failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Requeue | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Reconciling) => true,
            (Self::Reconciling, n) => n.is_terminal(),
            (current, Self::Idle) => current.is_terminal(),
            _ => false,
        }
    }
}

impl From<&ReconcileResult> for Phase {
    fn from(result: &ReconcileResult) -> Self {
        match result {
            ReconcileResult::Success => Self::Success,
            ReconcileResult::RequeueAfter(_) => Self::Requeue,
            ReconcileResult::Failed(_) => Self::Failed,
        }
    }
}

/// Backoff state for a specific target
/// Tracks consecutive transient failures and the backoff calculator
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(start, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Tunables of the reconciler, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub sync_period: Duration,
    pub backoff_start: Duration,
    /// Always strictly below `sync_period`
    pub backoff_max: Duration,
    pub max_transient_requeues: u32,
    pub api_retry_attempts: u32,
    pub api_retry_delay: Duration,
}

impl ReconcilerSettings {
    /// Resolve settings; the backoff ceiling is clamped to half the sync period
    /// and neither bound drops below [`MIN_BACKOFF_MS`]
    #[must_use]
    pub fn new(options: &BootstrapOptions, config: &ControllerConfig) -> Self {
        let sync_period = options.sync_period;
        let floor = Duration::from_millis(MIN_BACKOFF_MS);
        let backoff_max = config.backoff_max_duration().min(sync_period / 2).max(floor);
        let backoff_start = config.backoff_start_duration().clamp(floor, backoff_max);

        Self {
            sync_period,
            backoff_start,
            backoff_max,
            max_transient_requeues: config.max_transient_requeues,
            api_retry_attempts: config.api_retry_attempts.max(1),
            api_retry_delay: config.api_retry_delay(),
        }
    }
}

/// Bootstrap reconciler
///
/// Shared across passes; per-target backoff and phase live behind mutexes that are
/// never held across an await.
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) cluster: Arc<dyn ClusterApi>,
    pub(crate) upstream: Arc<dyn UpstreamApi>,
    pub(crate) settings: ReconcilerSettings,
    // Keyed by target (namespace/name)
    pub(crate) backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub(crate) phases: Arc<Mutex<HashMap<String, Phase>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("namespace", &self.cluster.namespace())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        upstream: Arc<dyn UpstreamApi>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            cluster,
            upstream,
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            phases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Current phase of `target`; `Idle` if it was never reconciled
    #[must_use]
    pub fn phase(&self, target: &TargetRef) -> Phase {
        lock(&self.phases)
            .get(&target.to_string())
            .copied()
            .unwrap_or_default()
    }

    /// Consecutive transient failures recorded for `target`
    #[must_use]
    pub fn transient_failures(&self, target: &TargetRef) -> u32 {
        lock(&self.backoff_states)
            .get(&target.to_string())
            .map_or(0, |state| state.error_count)
    }

    pub(crate) fn set_phase(&self, target: &TargetRef, next: Phase) {
        let mut phases = lock(&self.phases);
        let current = phases.entry(target.to_string()).or_default();
        if current.is_terminal() && next == Phase::Reconciling {
            tracing::trace!(target_ref = %target, from = current.as_str(), "phase -> Idle");
            *current = Phase::Idle;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(
                target_ref = %target,
                from = current.as_str(),
                to = next.as_str(),
                "Unexpected phase transition"
            );
        }
        *current = next;
    }
}

/// Lock a mutex, continuing with the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
