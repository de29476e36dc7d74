//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` always wins; otherwise the bootstrapper
//! logs at `info`, or `debug` when `--debug` is set.

use crate::config::LogFormat;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

const CRATE_TARGET: &str = "uxp_bootstrapper";

/// Filter used when `RUST_LOG` is not set
#[must_use]
pub fn default_directive(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("{CRATE_TARGET}={level}")
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_logging(debug: bool, format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(debug).into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}")),
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "uxp_bootstrapper=info");
        assert_eq!(default_directive(true), "uxp_bootstrapper=debug");
    }
}
