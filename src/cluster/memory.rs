//! In-memory implementation of [`ClusterApi`].
//!
//! Behaves like a single-namespace API server: `create` fails with 409 when the
//! object exists, `update` fails with 404 when it does not and with 409 when the
//! submitted `resourceVersion` is stale. Every successful write bumps the
//! `resourceVersion` and emits a [`WatchEvent`].

use super::{ClusterApi, ClusterError, ResourceKind, WatchEvent};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const WATCH_BUFFER: usize = 64;

#[derive(Default)]
struct Store {
    secrets: BTreeMap<String, Secret>,
    config_maps: BTreeMap<String, ConfigMap>,
    resource_version: u64,
    write_failures: VecDeque<ClusterError>,
    read_delay: Option<Duration>,
}

impl Store {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

struct Inner {
    namespace: String,
    store: Mutex<Store>,
    events: broadcast::Sender<WatchEvent>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Shared in-process cluster; clones see the same objects
#[derive(Clone)]
pub struct InMemoryCluster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("namespace", &self.inner.namespace)
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish_non_exhaustive()
    }
}

impl InMemoryCluster {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Arc::new(Inner {
                namespace: namespace.to_string(),
                store: Mutex::new(Store::default()),
                events,
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of get calls served
    #[must_use]
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of successful create/update calls made through [`ClusterApi`]
    #[must_use]
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Fail the next write with `error`; queued failures are consumed in order
    pub fn fail_next_write(&self, error: ClusterError) {
        self.store().write_failures.push_back(error);
    }

    /// Delay every subsequent get call by `delay`
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.store().read_delay = delay;
    }

    /// Create or overwrite a Secret as another actor would, bypassing write accounting
    pub fn put_secret(&self, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: self.metadata(name),
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        };
        self.store_secret(secret);
        self.notify(ResourceKind::Secret, name);
    }

    /// Create or overwrite a ConfigMap as another actor would, bypassing write accounting
    pub fn put_config_map(&self, config_map: ConfigMap) {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.store_config_map(config_map);
        self.notify(ResourceKind::ConfigMap, &name);
    }

    /// Remove a Secret as another actor would
    pub fn delete_secret(&self, name: &str) {
        if self.store().secrets.remove(name).is_some() {
            self.notify(ResourceKind::Secret, name);
        }
    }

    /// Remove a ConfigMap as another actor would
    pub fn delete_config_map(&self, name: &str) {
        if self.store().config_maps.remove(name).is_some() {
            self.notify(ResourceKind::ConfigMap, name);
        }
    }

    /// Current copy of a Secret
    #[must_use]
    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.store().secrets.get(name).cloned()
    }

    /// Current copy of a ConfigMap
    #[must_use]
    pub fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.store().config_maps.get(name).cloned()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        // A panic while holding the lock leaves plain data behind; keep serving it
        self.inner
            .store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.inner.namespace.clone()),
            ..ObjectMeta::default()
        }
    }

    fn notify(&self, kind: ResourceKind, name: &str) {
        // No receivers is fine
        let _ = self.inner.events.send(WatchEvent {
            kind,
            name: name.to_string(),
        });
    }

    fn store_secret(&self, mut secret: Secret) -> Secret {
        let mut store = self.store();
        secret.metadata.namespace = Some(self.inner.namespace.clone());
        secret.metadata.resource_version = Some(store.next_version());
        let name = secret.metadata.name.clone().unwrap_or_default();
        store.secrets.insert(name, secret.clone());
        secret
    }

    fn store_config_map(&self, mut config_map: ConfigMap) -> ConfigMap {
        let mut store = self.store();
        config_map.metadata.namespace = Some(self.inner.namespace.clone());
        config_map.metadata.resource_version = Some(store.next_version());
        let name = config_map.metadata.name.clone().unwrap_or_default();
        store.config_maps.insert(name, config_map.clone());
        config_map
    }

    async fn before_read(&self) {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.store().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Validate a write, consuming an injected failure first
    fn check_write(
        &self,
        kind: ResourceKind,
        name: Option<&str>,
        submitted_version: Option<&str>,
        create: bool,
    ) -> Result<String, ClusterError> {
        let mut store = self.store();
        if let Some(error) = store.write_failures.pop_front() {
            return Err(error);
        }

        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Err(ClusterError::Api {
                code: 422,
                message: format!("{kind} name is required"),
            });
        };

        let stored_version = match kind {
            ResourceKind::Secret => store
                .secrets
                .get(name)
                .map(|s| s.metadata.resource_version.clone()),
            ResourceKind::ConfigMap => store
                .config_maps
                .get(name)
                .map(|c| c.metadata.resource_version.clone()),
        };

        match (create, stored_version) {
            (true, Some(_)) => Err(ClusterError::conflict(format!(
                "{kind} \"{name}\" already exists"
            ))),
            (false, None) => Err(ClusterError::not_found(format!(
                "{kind} \"{name}\" not found"
            ))),
            (false, Some(stored)) if stored.as_deref() != submitted_version => {
                Err(ClusterError::conflict(format!(
                    "Operation cannot be fulfilled on {kind} \"{name}\": the object has been modified"
                )))
            }
            _ => Ok(name.to_string()),
        }
    }

    fn record_write(&self, kind: ResourceKind, name: &str) {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(kind, name);
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClusterError> {
        self.before_read().await;
        Ok(self.secret(name))
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, ClusterError> {
        self.before_read().await;
        Ok(self.config_map(name))
    }

    async fn create_secret(&self, secret: Secret) -> Result<Secret, ClusterError> {
        let name = self.check_write(
            ResourceKind::Secret,
            secret.metadata.name.as_deref(),
            None,
            true,
        )?;
        let stored = self.store_secret(secret);
        self.record_write(ResourceKind::Secret, &name);
        Ok(stored)
    }

    async fn update_secret(&self, secret: Secret) -> Result<Secret, ClusterError> {
        let name = self.check_write(
            ResourceKind::Secret,
            secret.metadata.name.as_deref(),
            secret.metadata.resource_version.as_deref(),
            false,
        )?;
        let stored = self.store_secret(secret);
        self.record_write(ResourceKind::Secret, &name);
        Ok(stored)
    }

    async fn create_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError> {
        let name = self.check_write(
            ResourceKind::ConfigMap,
            config_map.metadata.name.as_deref(),
            None,
            true,
        )?;
        let stored = self.store_config_map(config_map);
        self.record_write(ResourceKind::ConfigMap, &name);
        Ok(stored)
    }

    async fn update_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError> {
        let name = self.check_write(
            ResourceKind::ConfigMap,
            config_map.metadata.name.as_deref(),
            config_map.metadata.resource_version.as_deref(),
            false,
        )?;
        let stored = self.store_config_map(config_map);
        self.record_write(ResourceKind::ConfigMap, &name);
        Ok(stored)
    }

    fn watch(&self) -> BoxStream<'static, WatchEvent> {
        let receiver = self.inner.events.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
