//! Kubernetes implementation of [`ClusterApi`].

use super::{ClusterApi, ClusterError, ResourceKind, WatchEvent};
use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, future};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, PostParams};
use kube_runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use tracing::{debug, warn};

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(api_err) => Self::Api {
                code: api_err.code,
                message: api_err.message,
            },
            kube::Error::SerdeError(e) => Self::Decode(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Secrets and ConfigMaps of one namespace through the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterApi {
    namespace: String,
    secrets: Api<Secret>,
    config_maps: Api<ConfigMap>,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            secrets: Api::namespaced(client.clone(), namespace),
            config_maps: Api::namespaced(client, namespace),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClusterError> {
        Ok(self.secrets.get_opt(name).await?)
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, ClusterError> {
        Ok(self.config_maps.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: Secret) -> Result<Secret, ClusterError> {
        Ok(self.secrets.create(&Self::post_params(), &secret).await?)
    }

    async fn update_secret(&self, secret: Secret) -> Result<Secret, ClusterError> {
        let name = secret.name_any();
        Ok(self
            .secrets
            .replace(&name, &Self::post_params(), &secret)
            .await?)
    }

    async fn create_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError> {
        Ok(self
            .config_maps
            .create(&Self::post_params(), &config_map)
            .await?)
    }

    async fn update_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, ClusterError> {
        let name = config_map.name_any();
        Ok(self
            .config_maps
            .replace(&name, &Self::post_params(), &config_map)
            .await?)
    }

    fn watch(&self) -> BoxStream<'static, WatchEvent> {
        let secrets = observations(self.secrets.clone(), ResourceKind::Secret, secret_fingerprint);
        let config_maps = observations(
            self.config_maps.clone(),
            ResourceKind::ConfigMap,
            config_map_fingerprint,
        );

        // Drop events that do not change content (resync, status, resourceVersion bumps)
        let mut seen: HashMap<(ResourceKind, String), String> = HashMap::new();
        stream::select(secrets, config_maps)
            .filter_map(move |observation| {
                let key = (observation.kind, observation.name.clone());
                let changed = match observation.fingerprint {
                    Some(fingerprint) => {
                        seen.insert(key, fingerprint.clone()).as_ref() != Some(&fingerprint)
                    }
                    None => seen.remove(&key).is_some(),
                };
                if changed {
                    debug!(kind = %observation.kind, name = %observation.name, "watch.event.changed");
                }
                future::ready(changed.then_some(WatchEvent {
                    kind: observation.kind,
                    name: observation.name,
                }))
            })
            .boxed()
    }
}

/// Content fingerprint of an object; `None` once deleted
struct Observation {
    kind: ResourceKind,
    name: String,
    fingerprint: Option<String>,
}

fn observations<K>(
    api: Api<K>,
    kind: ResourceKind,
    fingerprint: fn(&K) -> String,
) -> impl Stream<Item = Observation> + Send + 'static
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(move |event| {
            let observation = match event {
                Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
                    Some(Observation {
                        kind,
                        name: obj.name_any(),
                        fingerprint: Some(fingerprint(&obj)),
                    })
                }
                Ok(watcher::Event::Delete(obj)) => Some(Observation {
                    kind,
                    name: obj.name_any(),
                    fingerprint: None,
                }),
                Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "watch.stream.error");
                    None
                }
            };
            future::ready(observation)
        })
}

fn secret_fingerprint(secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    hash_labels(&mut hasher, secret.metadata.labels.as_ref());
    for (key, value) in secret.data.iter().flatten() {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(&value.0);
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

fn config_map_fingerprint(config_map: &ConfigMap) -> String {
    let mut hasher = Sha256::new();
    hash_labels(&mut hasher, config_map.metadata.labels.as_ref());
    for (key, value) in config_map.data.iter().flatten() {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

fn hash_labels(hasher: &mut Sha256, labels: Option<&BTreeMap<String, String>>) {
    for (key, value) in labels.into_iter().flatten() {
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([b'\n']);
    }
    hasher.update([1]);
}
