//! # Manager
//!
//! Owns the lifecycle of registered controllers.
//!
//! `run` starts every controller, marks the process ready and waits for the
//! shutdown token. On shutdown it marks the process not ready, lets in-flight
//! reconciliations finish within the grace period and aborts them otherwise.

use super::controller::Runnable;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("controller \"{0}\" is already registered")]
    DuplicateController(String),

    #[error("no controllers registered")]
    NoControllers,

    #[error("controller \"{name}\" stopped before shutdown was requested")]
    ControllerExited { name: String },

    #[error("controller \"{name}\" failed")]
    ControllerFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("shutdown grace period of {}s elapsed with reconciliations still in flight", .0.as_secs())]
    ShutdownTimeout(Duration),
}

pub struct Manager {
    runnables: Vec<Arc<dyn Runnable>>,
    grace_period: Duration,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field(
                "controllers",
                &self.runnables.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

impl Manager {
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            runnables: Vec::new(),
            grace_period,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a readiness flag, set while controllers are running
    #[must_use]
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    /// Register a controller; names must be unique
    ///
    /// # Errors
    /// Returns [`ManagerError::DuplicateController`] if the name is taken
    pub fn register<R>(&mut self, runnable: R) -> Result<(), ManagerError>
    where
        R: Runnable + 'static,
    {
        if self.runnables.iter().any(|r| r.name() == runnable.name()) {
            return Err(ManagerError::DuplicateController(
                runnable.name().to_string(),
            ));
        }
        info!(controller = runnable.name(), "Registered controller");
        self.runnables.push(Arc::new(runnable));
        Ok(())
    }

    /// Whether the manager currently reports ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Run until `shutdown` fires, then drain within the grace period
    ///
    /// # Errors
    /// - [`ManagerError::NoControllers`] if nothing was registered
    /// - [`ManagerError::ControllerFailed`] / [`ManagerError::ControllerExited`]
    ///   if a controller stops on its own
    /// - [`ManagerError::ShutdownTimeout`] if in-flight work outlives the grace period
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ManagerError> {
        if self.runnables.is_empty() {
            return Err(ManagerError::NoControllers);
        }

        let mut tasks = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::new();
        for runnable in &self.runnables {
            let runnable = runnable.clone();
            let cancel = shutdown.clone();
            let name = runnable.name().to_string();
            let handle = tasks.spawn(async move { runnable.start(cancel).await });
            names.insert(handle.id(), name);
        }

        self.ready.store(true, Ordering::Relaxed);
        info!(controllers = self.runnables.len(), "Manager started");

        let mut failure = None;
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested, stopping controllers");
            }
            Some(joined) = tasks.join_next_with_id() => {
                let error = exit_error(&mut names, joined)
                    .unwrap_or_else(|name| ManagerError::ControllerExited { name });
                error!(error = %error, "Controller stopped unexpectedly, shutting down");
                failure = Some(error);
                shutdown.cancel();
            }
        }

        self.ready.store(false, Ordering::Relaxed);
        info!(
            grace_period_secs = self.grace_period.as_secs(),
            "Marked not ready, waiting for in-flight reconciliations"
        );

        let drain = async {
            let mut errors = Vec::new();
            while let Some(joined) = tasks.join_next_with_id().await {
                if let Ok(error) = exit_error(&mut names, joined) {
                    errors.push(error);
                }
            }
            errors
        };
        let drained = tokio::time::timeout(self.grace_period, drain).await;

        match drained {
            Ok(errors) => {
                for error in &errors {
                    error!(error = %error, "Controller failed during shutdown");
                }
                if failure.is_none() {
                    failure = errors.into_iter().next();
                }
            }
            Err(_) => {
                warn!(
                    grace_period_secs = self.grace_period.as_secs(),
                    "Shutdown grace period elapsed, aborting in-flight reconciliations"
                );
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(ManagerError::ShutdownTimeout(self.grace_period));
            }
        }

        match failure {
            Some(error) => Err(error),
            None => {
                info!("Manager stopped");
                Ok(())
            }
        }
    }
}

/// `Ok(error)` for a failed controller, `Err(name)` for one that returned cleanly
fn exit_error(
    names: &mut HashMap<Id, String>,
    joined: Result<(Id, anyhow::Result<()>), JoinError>,
) -> Result<ManagerError, String> {
    match joined {
        Ok((id, Ok(()))) => Err(names.remove(&id).unwrap_or_default()),
        Ok((id, Err(source))) => Ok(ManagerError::ControllerFailed {
            name: names.remove(&id).unwrap_or_default(),
            source,
        }),
        Err(e) => Ok(ManagerError::ControllerFailed {
            name: names.remove(&e.id()).unwrap_or_default(),
            source: anyhow::anyhow!("controller task failed: {e}"),
        }),
    }
}
