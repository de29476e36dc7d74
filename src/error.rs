//! # Startup Errors
//!
//! Errors that abort the process, labelled with the stage that failed.

use std::fmt;
use thiserror::Error;

/// Startup phase an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Options validation and Kubernetes client configuration
    Config,
    /// Client construction and manager creation
    CreateManager,
    /// Controller registration
    RegisterController,
    /// Running the manager until shutdown
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "cannot get config",
            Self::CreateManager => "cannot create manager",
            Self::RegisterController => "cannot add bootstrap controller to manager",
            Self::Run => "cannot start controller manager",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StartupError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl StartupError {
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Wrap errors of `stage`; for use with `map_err`
pub fn at_stage<E>(stage: Stage) -> impl FnOnce(E) -> StartupError
where
    E: Into<anyhow::Error>,
{
    move |e| StartupError::new(stage, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_message_names_stage() {
        let error = StartupError::new(Stage::Config, ConfigError::ZeroSyncPeriod);
        assert_eq!(
            error.to_string(),
            "cannot get config: sync period must be greater than zero"
        );

        let error: Result<(), _> =
            Err(anyhow::anyhow!("boom")).map_err(at_stage(Stage::RegisterController));
        assert_eq!(
            error.unwrap_err().to_string(),
            "cannot add bootstrap controller to manager: boom"
        );
    }
}
