//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one event per line
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
    /// Time allowed for in-flight reconciliations to finish after a shutdown signal (seconds)
    pub shutdown_grace_period_secs: u64,
    /// Maximum concurrent reconciliations
    /// Distinct targets run in parallel up to this limit; one target never runs twice at once
    pub max_concurrent_reconciliations: usize,
    /// Exponential backoff starting value (milliseconds)
    /// Initial delay before requeueing after a transient error
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    /// Further capped below the sync period when the requeue is computed
    pub backoff_max_ms: u64,
    /// Consecutive transient failures before a target falls back to the sync period
    pub max_transient_requeues: u32,
    /// Upbound API attempts within a single reconciliation pass
    pub api_retry_attempts: u32,
    /// Delay between Upbound API attempts within a pass (milliseconds)
    pub api_retry_delay_ms: u64,
    /// Per-request timeout for Upbound API calls (seconds)
    pub api_request_timeout_secs: u64,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            shutdown_grace_period_secs: DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            max_transient_requeues: DEFAULT_MAX_TRANSIENT_REQUEUES,
            api_retry_attempts: DEFAULT_API_RETRY_ATTEMPTS,
            api_retry_delay_ms: DEFAULT_API_RETRY_DELAY_MS,
            api_request_timeout_secs: DEFAULT_API_REQUEST_TIMEOUT_SECS,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup with defaults
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            metrics_port: parse_value(&lookup, "METRICS_PORT").unwrap_or(defaults.metrics_port),
            shutdown_grace_period_secs: parse_value(&lookup, "SHUTDOWN_GRACE_PERIOD_SECS")
                .unwrap_or(defaults.shutdown_grace_period_secs),
            max_concurrent_reconciliations: parse_value(&lookup, "MAX_CONCURRENT_RECONCILIATIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_reconciliations),
            backoff_start_ms: parse_value(&lookup, "BACKOFF_START_MS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.backoff_start_ms),
            backoff_max_ms: parse_value(&lookup, "BACKOFF_MAX_MS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.backoff_max_ms),
            max_transient_requeues: parse_value(&lookup, "MAX_TRANSIENT_REQUEUES")
                .unwrap_or(defaults.max_transient_requeues),
            api_retry_attempts: parse_value(&lookup, "API_RETRY_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.api_retry_attempts),
            api_retry_delay_ms: parse_value(&lookup, "API_RETRY_DELAY_MS")
                .unwrap_or(defaults.api_retry_delay_ms),
            api_request_timeout_secs: parse_value(&lookup, "API_REQUEST_TIMEOUT_SECS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.api_request_timeout_secs),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
        }
    }

    /// Get shutdown grace period duration
    #[must_use]
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get delay between in-pass API attempts
    #[must_use]
    pub fn api_retry_delay(&self) -> Duration {
        Duration::from_millis(self.api_retry_delay_ms)
    }

    /// Get Upbound API request timeout
    #[must_use]
    pub fn api_request_timeout(&self) -> Duration {
        Duration::from_secs(self.api_request_timeout_secs)
    }
}

/// Read a value through `lookup` and parse it, or `None` if unset or unparseable
fn parse_value<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(30));
        assert_eq!(config.backoff_start_duration(), Duration::from_secs(1));
        assert_eq!(config.api_retry_attempts, 3);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "9090"),
            ("SHUTDOWN_GRACE_PERIOD_SECS", "5"),
            ("MAX_CONCURRENT_RECONCILIATIONS", "2"),
            ("BACKOFF_MAX_MS", "60000"),
            ("LOG_FORMAT", "JSON"),
        ]));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.shutdown_grace_period_secs, 5);
        assert_eq!(config.max_concurrent_reconciliations, 2);
        assert_eq!(config.backoff_max_duration(), Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "not-a-port"),
            ("MAX_CONCURRENT_RECONCILIATIONS", "0"),
            ("API_RETRY_ATTEMPTS", "0"),
            ("BACKOFF_START_MS", "0"),
            ("BACKOFF_MAX_MS", "0"),
            ("LOG_FORMAT", "xml"),
        ]));
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.max_concurrent_reconciliations, 4);
        assert_eq!(config.api_retry_attempts, 3);
        assert_eq!(config.backoff_start_duration(), Duration::from_secs(1));
        assert_eq!(config.backoff_max_duration(), Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Text);
    }
}
