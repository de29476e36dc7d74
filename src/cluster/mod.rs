//! # Cluster API
//!
//! Namespace-scoped access to the objects the bootstrapper reads and writes.
//!
//! - [`KubeClusterApi`]: Kubernetes API server via `kube`
//! - `InMemoryCluster`: in-process store for tests (`test-util` feature)
//!
//! Both implementations offer get/create/update for Secrets and ConfigMaps and a
//! watch stream that yields one [`WatchEvent`] per observed change.

mod kubernetes;
#[cfg(any(test, feature = "test-util"))]
mod memory;

pub use kubernetes::KubeClusterApi;
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryCluster;

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::fmt;
use thiserror::Error;

/// Kind of a bootstrap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Secret,
    ConfigMap,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change observed on an object in the watched namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ResourceKind,
    pub name: String,
}

/// Cluster API failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The API server answered with an error status
    #[error("Kubernetes API error (HTTP {code}): {message}")]
    Api { code: u16, message: String },

    /// The API server could not be reached or the request timed out
    #[error("Kubernetes API unavailable: {0}")]
    Transport(String),

    /// The response could not be decoded
    #[error("Kubernetes API response could not be decoded: {0}")]
    Decode(String),
}

impl ClusterError {
    /// Conflict on optimistic concurrency (resourceVersion mismatch or already exists)
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Api {
            code: 409,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Api {
            code: 404,
            message: message.into(),
        }
    }

    /// Whether retrying later may succeed
    ///
    /// Conflicts, throttling, server errors and transport failures are transient.
    /// Invalid (400/422), forbidden (403) and other 4xx responses are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => *code == 409 || *code == 429 || *code >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) => false,
        }
    }

    /// Short classification used in logs and requeue metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Api { code: 409, .. } => "conflict",
            Self::Api { code: 429, .. } => "throttled",
            Self::Api { code: 403, .. } => "forbidden",
            Self::Api { code: 400 | 422, .. } => "invalid",
            Self::Api { code, .. } if *code >= 500 => "server_error",
            Self::Api { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }
}

/// Namespace-scoped Secret and ConfigMap access
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Namespace every call is scoped to
    fn namespace(&self) -> &str;

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClusterError>;

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, ClusterError>;

    async fn create_secret(&self, secret: Secret) -> Result<Secret, ClusterError>;

    /// Replace a Secret; the object's `resourceVersion` must match the stored one
    async fn update_secret(&self, secret: Secret) -> Result<Secret, ClusterError>;

    async fn create_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError>;

    /// Replace a ConfigMap; the object's `resourceVersion` must match the stored one
    async fn update_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError>;

    /// Stream of changes to Secrets and ConfigMaps in the namespace
    fn watch(&self) -> BoxStream<'static, WatchEvent>;
}
