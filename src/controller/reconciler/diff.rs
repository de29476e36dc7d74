//! # Diff
//!
//! Compares observed and desired state and produces the minimal changeset.
//!
//! - Missing objects are created.
//! - Drifted objects are updated from the observed copy, so foreign keys,
//!   labels and annotations survive and the `resourceVersion` is carried for
//!   optimistic concurrency.
//! - Condition annotations are rewritten only when status or reason changes.

use super::condition::Condition;
use super::state::{DesiredState, ObservedState};
use crate::cluster::ResourceKind;
use crate::constants::{
    CONTROL_PLANE_ID_KEY, CONTROLLER_NAME, IDENTITY_CONFIG_MAP, JWT_PUBLIC_KEY_KEY,
    MANAGED_BY_LABEL, NATS_CA_KEY, PUBLIC_CERTS_SECRET,
};
use crate::upbound::PublicCerts;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// One corrective write
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateConfigMap(ConfigMap),
    UpdateConfigMap(ConfigMap),
    CreateSecret(Secret),
    UpdateSecret(Secret),
}

impl Change {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::CreateConfigMap(_) | Self::UpdateConfigMap(_) => ResourceKind::ConfigMap,
            Self::CreateSecret(_) | Self::UpdateSecret(_) => ResourceKind::Secret,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateConfigMap(_) | Self::CreateSecret(_) => "create",
            Self::UpdateConfigMap(_) | Self::UpdateSecret(_) => "update",
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        let meta = match self {
            Self::CreateConfigMap(c) | Self::UpdateConfigMap(c) => &c.metadata,
            Self::CreateSecret(s) | Self::UpdateSecret(s) => &s.metadata,
        };
        meta.name.as_deref().unwrap_or_default()
    }
}

/// Changes needed to move `observed` to `desired`; empty when in sync
#[must_use]
pub fn diff(namespace: &str, observed: &ObservedState, desired: &DesiredState) -> Vec<Change> {
    let mut changes = Vec::new();

    if let Some(change) = identity_change(namespace, observed, desired) {
        changes.push(change);
    }
    if let Some(certs) = &desired.public_certs {
        if let Some(change) = certs_change(namespace, observed.public_certs.as_ref(), certs) {
            changes.push(change);
        }
    }

    changes
}

fn identity_change(
    namespace: &str,
    observed: &ObservedState,
    desired: &DesiredState,
) -> Option<Change> {
    let Some(current) = &observed.identity else {
        let mut annotations = BTreeMap::new();
        desired.condition.write_to(&mut annotations);
        return Some(Change::CreateConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some(IDENTITY_CONFIG_MAP.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                annotations: Some(annotations),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                CONTROL_PLANE_ID_KEY.to_string(),
                desired.control_plane_id.clone(),
            )])),
            ..ConfigMap::default()
        }));
    };

    let mut updated = current.clone();
    updated
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(CONTROL_PLANE_ID_KEY.to_string(), desired.control_plane_id.clone());
    ensure_managed_label(&mut updated.metadata);

    let observed_condition = Condition::from_annotations(current.metadata.annotations.as_ref());
    if observed_condition
        .as_ref()
        .is_none_or(|c| !c.same_state(&desired.condition))
    {
        desired
            .condition
            .write_to(updated.metadata.annotations.get_or_insert_with(BTreeMap::new));
    }

    if updated == *current {
        return None;
    }
    updated.metadata.managed_fields = None;
    Some(Change::UpdateConfigMap(updated))
}

fn certs_change(namespace: &str, current: Option<&Secret>, certs: &PublicCerts) -> Option<Change> {
    let Some(current) = current else {
        return Some(Change::CreateSecret(Secret {
            metadata: ObjectMeta {
                name: Some(PUBLIC_CERTS_SECRET.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                ..ObjectMeta::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(certs_data(certs)),
            ..Secret::default()
        }));
    };

    let mut updated = current.clone();
    updated
        .data
        .get_or_insert_with(BTreeMap::new)
        .extend(certs_data(certs));
    ensure_managed_label(&mut updated.metadata);

    if updated == *current {
        return None;
    }
    updated.metadata.managed_fields = None;
    Some(Change::UpdateSecret(updated))
}

fn certs_data(certs: &PublicCerts) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (
            JWT_PUBLIC_KEY_KEY.to_string(),
            ByteString(certs.jwt_public_key.as_bytes().to_vec()),
        ),
        (
            NATS_CA_KEY.to_string(),
            ByteString(certs.nats_ca.as_bytes().to_vec()),
        ),
    ])
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string())])
}

fn ensure_managed_label(meta: &mut ObjectMeta) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::condition::REASON_BOOTSTRAPPED;
    use crate::controller::reconciler::state::UpstreamOutcome;
    use chrono::Utc;

    const NS: &str = "upbound-system";

    fn certs() -> PublicCerts {
        PublicCerts {
            jwt_public_key: "jwt-pem".into(),
            nats_ca: "ca-pem".into(),
        }
    }

    /// Observed state equal to what applying `changes` would produce
    fn apply(mut observed: ObservedState, changes: Vec<Change>) -> ObservedState {
        for change in changes {
            match change {
                Change::CreateConfigMap(c) | Change::UpdateConfigMap(c) => {
                    observed.identity = Some(c);
                }
                Change::CreateSecret(s) | Change::UpdateSecret(s) => {
                    observed.public_certs = Some(s);
                }
            }
        }
        observed
    }

    #[test]
    fn test_empty_cluster_creates_everything() {
        let observed = ObservedState::default();
        let desired =
            DesiredState::build(&observed, &UpstreamOutcome::Certs(certs()), Utc::now());

        let changes = diff(NS, &observed, &desired);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind(), ResourceKind::ConfigMap);
        assert_eq!(changes[0].operation(), "create");
        assert_eq!(changes[0].name(), IDENTITY_CONFIG_MAP);
        assert_eq!(changes[1].kind(), ResourceKind::Secret);
        assert_eq!(changes[1].name(), PUBLIC_CERTS_SECRET);
    }

    #[test]
    fn test_in_sync_produces_no_changes() {
        let observed = ObservedState::default();
        let desired =
            DesiredState::build(&observed, &UpstreamOutcome::Certs(certs()), Utc::now());
        let observed = apply(observed, diff(NS, &ObservedState::default(), &desired));

        let desired = DesiredState::build(&observed, &UpstreamOutcome::Certs(certs()), Utc::now());
        assert!(diff(NS, &observed, &desired).is_empty());
    }

    #[test]
    fn test_drifted_secret_is_updated_preserving_foreign_keys() {
        let mut secret = Secret {
            metadata: ObjectMeta {
                name: Some(PUBLIC_CERTS_SECRET.into()),
                resource_version: Some("7".into()),
                labels: Some(BTreeMap::from([("team".to_string(), "infra".to_string())])),
                ..ObjectMeta::default()
            },
            data: Some(certs_data(&PublicCerts {
                jwt_public_key: "old".into(),
                nats_ca: "ca-pem".into(),
            })),
            ..Secret::default()
        };
        if let Some(data) = secret.data.as_mut() {
            data.insert("extra".into(), ByteString(b"keep".to_vec()));
        }

        let change = certs_change(NS, Some(&secret), &certs()).unwrap();
        let Change::UpdateSecret(updated) = change else {
            panic!("expected secret update");
        };
        let data = updated.data.unwrap();
        assert_eq!(data[JWT_PUBLIC_KEY_KEY].0, b"jwt-pem");
        assert_eq!(data["extra"].0, b"keep");
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("7"));
        let labels = updated.metadata.labels.unwrap();
        assert_eq!(labels["team"], "infra");
        assert_eq!(labels[MANAGED_BY_LABEL], CONTROLLER_NAME);
    }

    #[test]
    fn test_condition_written_only_on_transition() {
        let observed = ObservedState::default();
        let desired =
            DesiredState::build(&observed, &UpstreamOutcome::Certs(certs()), Utc::now());
        let observed = apply(observed, diff(NS, &ObservedState::default(), &desired));

        // Same state, different message: no write
        let mut desired = DesiredState::build(&observed, &UpstreamOutcome::Certs(certs()), Utc::now());
        desired.condition.message = "reworded".into();
        assert!(diff(NS, &observed, &desired).is_empty());

        // Different reason: the ConfigMap is updated
        let failed = DesiredState::build(
            &observed,
            &UpstreamOutcome::Failed(crate::upbound::ApiError::Unauthorized { status: 401 }),
            Utc::now(),
        );
        let changes = diff(NS, &observed, &failed);
        assert_eq!(changes.len(), 1);
        let Change::UpdateConfigMap(updated) = &changes[0] else {
            panic!("expected ConfigMap update");
        };
        let condition =
            Condition::from_annotations(updated.metadata.annotations.as_ref()).unwrap();
        assert!(!condition.ready);
        assert_ne!(condition.reason, REASON_BOOTSTRAPPED);
    }

    #[test]
    fn test_certs_left_alone_without_desired_certs() {
        let observed = ObservedState {
            public_certs: Some(Secret {
                metadata: ObjectMeta {
                    name: Some(PUBLIC_CERTS_SECRET.into()),
                    ..ObjectMeta::default()
                },
                ..Secret::default()
            }),
            ..ObservedState::default()
        };
        let desired = DesiredState::build(&observed, &UpstreamOutcome::NoToken, Utc::now());
        let changes = diff(NS, &observed, &desired);
        assert!(changes.iter().all(|c| c.kind() == ResourceKind::ConfigMap));
    }
}
