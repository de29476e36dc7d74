//! # Initialization
//!
//! Startup sequence of the bootstrapper.
//!
//! Each stage wraps its failure in a [`StartupError`] naming the stage:
//!
//! 1. **Config**: validate options, infer the Kubernetes client configuration
//! 2. **Create manager**: build the Kubernetes and Upbound clients and the manager
//! 3. **Register controller**: add the bootstrap controller
//! 4. **Run**: run the manager until SIGINT/SIGTERM

use super::controller::Controller;
use super::manager::Manager;
use super::signal::cancel_on_signal;
use crate::cluster::{ClusterApi, KubeClusterApi, ResourceKind, WatchEvent};
use crate::config::{BootstrapOptions, ControllerConfig};
use crate::constants::{CONTROL_PLANE_TOKEN_SECRET, IDENTITY_CONFIG_MAP, PUBLIC_CERTS_SECRET};
use crate::controller::reconciler::{Reconciler, ReconcilerSettings, TargetRef};
use crate::error::{Stage, StartupError, at_stage};
use crate::upbound::{UpboundClient, UpstreamApi};
use futures::{StreamExt, future};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Name the bootstrap controller registers under
pub const BOOTSTRAP_CONTROLLER: &str = "bootstrap";

/// Run the bootstrapper until a shutdown signal arrives
///
/// # Errors
/// Returns a [`StartupError`] naming the stage that failed
pub async fn run(
    options: BootstrapOptions,
    config: &ControllerConfig,
    ready: Arc<AtomicBool>,
) -> Result<(), StartupError> {
    options.validate().map_err(at_stage(Stage::Config))?;
    let kube_config = kube::Config::infer()
        .await
        .map_err(at_stage(Stage::Config))?;

    info!(
        namespace = %options.namespace,
        upbound_api_url = %options.upbound_api_url,
        sync_period_secs = options.sync_period.as_secs(),
        "Creating controller manager"
    );

    let client = kube::Client::try_from(kube_config).map_err(at_stage(Stage::CreateManager))?;
    let cluster = Arc::new(KubeClusterApi::new(client, &options.namespace));
    let upstream = Arc::new(
        UpboundClient::new(
            &options.upbound_api_url,
            options.debug,
            config.api_request_timeout(),
        )
        .map_err(at_stage(Stage::CreateManager))?,
    );

    let manager = assemble(&options, config, cluster, upstream, ready)?;

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());
    let result = manager.run(shutdown).await;
    signals.abort();

    result.map_err(at_stage(Stage::Run))
}

/// Build a manager with the bootstrap controller registered
///
/// # Errors
/// Returns a [`StartupError`] at [`Stage::RegisterController`] if registration fails
pub fn assemble(
    options: &BootstrapOptions,
    config: &ControllerConfig,
    cluster: Arc<dyn ClusterApi>,
    upstream: Arc<dyn UpstreamApi>,
    ready: Arc<AtomicBool>,
) -> Result<Manager, StartupError> {
    let mut manager = Manager::new(config.shutdown_grace_period()).with_readiness(ready);
    manager
        .register(bootstrap_controller(options, config, cluster, upstream))
        .map_err(at_stage(Stage::RegisterController))?;
    Ok(manager)
}

/// The controller reconciling the bootstrap resource set of the watched namespace
#[must_use]
pub fn bootstrap_controller(
    options: &BootstrapOptions,
    config: &ControllerConfig,
    cluster: Arc<dyn ClusterApi>,
    upstream: Arc<dyn UpstreamApi>,
) -> Controller {
    let target = TargetRef::bootstrap(&options.namespace);
    let trigger_target = target.clone();
    let triggers = cluster
        .watch()
        .filter(|event| future::ready(is_bootstrap_object(event)))
        .map(move |event| {
            tracing::debug!(kind = %event.kind, name = %event.name, "Bootstrap object changed");
            trigger_target.clone()
        })
        .boxed();

    let settings = ReconcilerSettings::new(options, config);
    let reconciler = Reconciler::new(cluster, upstream, settings);

    Controller::new(BOOTSTRAP_CONTROLLER, Arc::new(reconciler), options.sync_period)
        .with_target(target)
        .with_triggers(triggers)
        .with_max_concurrent(config.max_concurrent_reconciliations)
}

fn is_bootstrap_object(event: &WatchEvent) -> bool {
    match event.kind {
        ResourceKind::Secret => {
            event.name == CONTROL_PLANE_TOKEN_SECRET || event.name == PUBLIC_CERTS_SECRET
        }
        ResourceKind::ConfigMap => event.name == IDENTITY_CONFIG_MAP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ResourceKind, name: &str) -> WatchEvent {
        WatchEvent {
            kind,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_only_bootstrap_objects_trigger() {
        assert!(is_bootstrap_object(&event(
            ResourceKind::Secret,
            CONTROL_PLANE_TOKEN_SECRET
        )));
        assert!(is_bootstrap_object(&event(
            ResourceKind::Secret,
            PUBLIC_CERTS_SECRET
        )));
        assert!(is_bootstrap_object(&event(
            ResourceKind::ConfigMap,
            IDENTITY_CONFIG_MAP
        )));
        assert!(!is_bootstrap_object(&event(
            ResourceKind::ConfigMap,
            PUBLIC_CERTS_SECRET
        )));
        assert!(!is_bootstrap_object(&event(ResourceKind::Secret, "other")));
    }
}
