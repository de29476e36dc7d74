//! # Exponential Backoff
//!
//! Provides a doubling backoff for requeueing targets after transient failures.
//!
//! Sequence with a 1s start and 30s ceiling: 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use uxp_bootstrapper::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each call to [`next_backoff`](Self::next_backoff) returns the current delay and
/// doubles it for the next call, never exceeding the ceiling.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay (and the value restored by `reset`)
    start: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Upper bound on any returned delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff starting at `start` and capped at `max`
    ///
    /// A ceiling below the start is raised to the start.
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        let max = max.max(start);
        Self {
            start,
            current: start,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Peek at the delay the next call would return
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.start;
    }
}
