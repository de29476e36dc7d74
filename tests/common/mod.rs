//! Common test utilities for integration tests
//!
//! Provides rustls setup, a scripted Upbound API and fixture builders.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uxp_bootstrapper::cluster::InMemoryCluster;
use uxp_bootstrapper::config::{BootstrapOptions, ControllerConfig};
use uxp_bootstrapper::constants::{CONTROL_PLANE_TOKEN_KEY, CONTROL_PLANE_TOKEN_SECRET};
use uxp_bootstrapper::controller::reconciler::{Reconciler, ReconcilerSettings};
use uxp_bootstrapper::upbound::{ApiError, PublicCerts, UpstreamApi};

pub const NAMESPACE: &str = "upbound-system";
pub const TOKEN: &str = "test-control-plane-token";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it is only installed once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub fn certs() -> PublicCerts {
    PublicCerts {
        jwt_public_key: "-----BEGIN PUBLIC KEY-----\njwt\n-----END PUBLIC KEY-----".to_string(),
        nats_ca: "-----BEGIN CERTIFICATE-----\nca\n-----END CERTIFICATE-----".to_string(),
    }
}

/// Upbound API double answering from a script, then with a fallback
#[derive(Debug)]
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Result<PublicCerts, ApiError>>>,
    fallback: Result<PublicCerts, ApiError>,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn answering(fallback: Result<PublicCerts, ApiError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::answering(Ok(certs()))
    }

    /// Answer the next call with `response`, ahead of the fallback
    pub fn then(&self, response: Result<PublicCerts, ApiError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamApi for ScriptedUpstream {
    async fn gateway_certs(
        &self,
        token: &str,
        _cancel: &CancellationToken,
    ) -> Result<PublicCerts, ApiError> {
        assert_eq!(token, TOKEN, "reconciler must pass the stored token");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn options() -> BootstrapOptions {
    BootstrapOptions {
        sync_period: Duration::from_secs(600),
        namespace: NAMESPACE.to_string(),
        ..BootstrapOptions::default()
    }
}

/// Controller config without in-pass API retries, so each pass calls upstream once
pub fn config() -> ControllerConfig {
    ControllerConfig {
        api_retry_attempts: 1,
        ..ControllerConfig::default()
    }
}

pub fn cluster_with_token() -> InMemoryCluster {
    let cluster = InMemoryCluster::new(NAMESPACE);
    cluster.put_secret(CONTROL_PLANE_TOKEN_SECRET, &[(CONTROL_PLANE_TOKEN_KEY, TOKEN)]);
    cluster
}

pub fn reconciler(cluster: &InMemoryCluster, upstream: Arc<ScriptedUpstream>) -> Reconciler {
    reconciler_with(cluster, upstream, &config())
}

pub fn reconciler_with(
    cluster: &InMemoryCluster,
    upstream: Arc<ScriptedUpstream>,
    config: &ControllerConfig,
) -> Reconciler {
    Reconciler::new(
        Arc::new(cluster.clone()),
        upstream,
        ReconcilerSettings::new(&options(), config),
    )
}

/// Controller config allowing `attempts` Upbound calls per pass
pub fn config_with_retries(attempts: u32) -> ControllerConfig {
    ControllerConfig {
        api_retry_attempts: attempts,
        ..ControllerConfig::default()
    }
}

/// String value of `key` in a Secret's data
pub fn secret_value(cluster: &InMemoryCluster, name: &str, key: &str) -> Option<String> {
    let secret = cluster.secret(name)?;
    let bytes = secret.data?.remove(key)?;
    String::from_utf8(bytes.0).ok()
}

/// String value of `key` in a ConfigMap's data
pub fn config_map_value(cluster: &InMemoryCluster, name: &str, key: &str) -> Option<String> {
    cluster.config_map(name)?.data?.remove(key)
}

/// Annotation `key` on a ConfigMap
pub fn annotation(cluster: &InMemoryCluster, name: &str, key: &str) -> Option<String> {
    cluster.config_map(name)?.metadata.annotations?.remove(key)
}
