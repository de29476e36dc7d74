//! # State
//!
//! Observed and desired state of the bootstrap resource set.

use super::condition::{Condition, REASON_BOOTSTRAPPED, REASON_WAITING_FOR_TOKEN};
use crate::constants::{CONTROL_PLANE_ID_KEY, CONTROL_PLANE_TOKEN_KEY, CONTROL_PLANE_TOKEN_SECRET};
use crate::upbound::{ApiError, PublicCerts};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use zeroize::Zeroizing;

/// Objects read at the start of a pass
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    pub token_secret: Option<Secret>,
    pub public_certs: Option<Secret>,
    pub identity: Option<ConfigMap>,
}

impl ObservedState {
    /// Control plane token, if the token Secret holds a non-empty one
    #[must_use]
    pub fn token(&self) -> Option<Zeroizing<String>> {
        let bytes = self
            .token_secret
            .as_ref()?
            .data
            .as_ref()?
            .get(CONTROL_PLANE_TOKEN_KEY)?;
        let token = Zeroizing::new(String::from_utf8_lossy(&bytes.0).trim().to_string());
        (!token.is_empty()).then_some(token)
    }

    /// Control plane ID already recorded in the identity ConfigMap
    #[must_use]
    pub fn control_plane_id(&self) -> Option<&str> {
        self.identity
            .as_ref()?
            .data
            .as_ref()?
            .get(CONTROL_PLANE_ID_KEY)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    /// Condition currently surfaced on the identity ConfigMap
    #[must_use]
    pub fn condition(&self) -> Option<Condition> {
        Condition::from_annotations(self.identity.as_ref()?.metadata.annotations.as_ref())
    }
}

/// Result of consulting the Upbound API during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// No token in the cluster yet; the API was not called
    NoToken,
    Certs(PublicCerts),
    Failed(ApiError),
}

/// What the bootstrap resource set should look like after this pass
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    /// Existing ID when one is recorded, a fresh UUIDv4 otherwise
    pub control_plane_id: String,
    /// `None` leaves the observed certs Secret untouched
    pub public_certs: Option<PublicCerts>,
    pub condition: Condition,
}

impl DesiredState {
    #[must_use]
    pub fn build(observed: &ObservedState, upstream: &UpstreamOutcome, now: DateTime<Utc>) -> Self {
        let control_plane_id = observed
            .control_plane_id()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        let previous = observed.condition();
        let (public_certs, condition) = match upstream {
            UpstreamOutcome::NoToken => (
                None,
                Condition::next(
                    previous.as_ref(),
                    false,
                    REASON_WAITING_FOR_TOKEN,
                    format!(
                        "Secret {CONTROL_PLANE_TOKEN_SECRET} has no {CONTROL_PLANE_TOKEN_KEY} key yet"
                    ),
                    now,
                ),
            ),
            UpstreamOutcome::Certs(certs) => (
                Some(certs.clone()),
                Condition::next(
                    previous.as_ref(),
                    true,
                    REASON_BOOTSTRAPPED,
                    "Control plane identity and gateway certificates are in place",
                    now,
                ),
            ),
            UpstreamOutcome::Failed(error) => (
                None,
                Condition::next(previous.as_ref(), false, error.reason(), error.to_string(), now),
            ),
        };

        Self {
            control_plane_id,
            public_certs,
            condition,
        }
    }
}
