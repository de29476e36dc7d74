//! # Error Policy
//!
//! Per-target exponential backoff for transient failures.
//!
//! Delays grow from the configured start up to a ceiling strictly below the
//! sync period. Once a target has failed more than `max_transient_requeues`
//! times in a row it falls back to the sync period until a pass succeeds.

use super::types::{BackoffState, Reconciler, TargetRef, lock};
use std::time::Duration;
use tracing::debug;

impl Reconciler {
    /// Record a transient failure and return the delay before the next attempt
    pub(crate) fn next_backoff(&self, target: &TargetRef) -> Duration {
        let settings = &self.settings;
        let mut states = lock(&self.backoff_states);
        let state = states
            .entry(target.to_string())
            .or_insert_with(|| BackoffState::new(settings.backoff_start, settings.backoff_max));

        state.increment_error();
        if state.error_count > settings.max_transient_requeues {
            debug!(
                error_count = state.error_count,
                "Transient requeue limit reached, falling back to sync period"
            );
            return settings.sync_period;
        }
        state.backoff.next_backoff()
    }

    pub(crate) fn reset_backoff(&self, target: &TargetRef) {
        if let Some(state) = lock(&self.backoff_states).get_mut(&target.to_string()) {
            state.reset();
        }
    }
}
