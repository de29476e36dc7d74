//! # Reconcile
//!
//! One pass over the bootstrap resource set:
//!
//! 1. Read the token Secret, certs Secret and identity ConfigMap
//! 2. With a token, fetch the gateway certificates (retried within the pass)
//! 3. Build the desired state and diff it against the observed state
//! 4. Apply the changeset
//! 5. Map the outcome to a [`ReconcileResult`]

use super::diff::{Change, diff};
use super::state::{DesiredState, ObservedState, UpstreamOutcome};
use super::types::{Phase, ReconcileError, ReconcileResult, Reconciler, TargetRef};
use crate::cluster::ClusterError;
use crate::constants::{CONTROL_PLANE_TOKEN_SECRET, IDENTITY_CONFIG_MAP, PUBLIC_CERTS_SECRET};
use crate::observability::metrics;
use crate::upbound::{ApiError, PublicCerts};
use chrono::Utc;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What a pass did before the outcome is mapped to a result
#[derive(Debug)]
struct PassReport {
    writes: usize,
    upstream_error: Option<ApiError>,
}

impl Reconciler {
    /// Run one reconciliation pass for `target`
    ///
    /// Never panics and never returns early without recording the phase.
    pub async fn reconcile(&self, target: &TargetRef, cancel: &CancellationToken) -> ReconcileResult {
        let span = info_span!(
            "controller.reconcile",
            namespace = %target.namespace,
            name = %target.name,
        );

        async {
            self.set_phase(target, Phase::Reconciling);
            metrics::increment_reconciliations();
            let start = Instant::now();

            let outcome = if target.namespace == self.cluster.namespace() {
                self.run_pass(cancel).await
            } else {
                Err(ReconcileError::OutOfScope(target.to_string()))
            };
            let result = self.handle_outcome(target, outcome);

            metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
            self.set_phase(target, Phase::from(&result));
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport, ReconcileError> {
        let observed = self.observe(cancel).await?;

        let upstream = match observed.token() {
            None => {
                info!(
                    secret = CONTROL_PLANE_TOKEN_SECRET,
                    "No control plane token yet, ensuring identity only"
                );
                UpstreamOutcome::NoToken
            }
            Some(token) => match self.fetch_certs(&token, cancel).await {
                Ok(certs) => UpstreamOutcome::Certs(certs),
                Err(ApiError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e) => UpstreamOutcome::Failed(e),
            },
        };

        let desired = DesiredState::build(&observed, &upstream, Utc::now());
        let changes = diff(self.cluster.namespace(), &observed, &desired);
        if changes.is_empty() {
            debug!("Bootstrap resources in sync, nothing to write");
        }
        let writes = self.apply(changes, cancel).await?;

        Ok(PassReport {
            writes,
            upstream_error: match upstream {
                UpstreamOutcome::Failed(e) => Some(e),
                UpstreamOutcome::NoToken | UpstreamOutcome::Certs(_) => None,
            },
        })
    }

    async fn observe(&self, cancel: &CancellationToken) -> Result<ObservedState, ReconcileError> {
        let token_secret =
            guarded(cancel, self.cluster.get_secret(CONTROL_PLANE_TOKEN_SECRET)).await?;
        let public_certs = guarded(cancel, self.cluster.get_secret(PUBLIC_CERTS_SECRET)).await?;
        let identity = guarded(cancel, self.cluster.get_config_map(IDENTITY_CONFIG_MAP)).await?;

        Ok(ObservedState {
            token_secret,
            public_certs,
            identity,
        })
    }

    /// Call the Upbound API, retrying transient failures within the pass
    async fn fetch_certs(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<PublicCerts, ApiError> {
        let attempts = self.settings.api_retry_attempts;
        let mut attempt = 1;
        loop {
            match self.upstream.gateway_certs(token, cancel).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(attempt, attempts, error = %e, "Upbound API unreachable, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(ApiError::Cancelled),
                        () = tokio::time::sleep(self.settings.api_retry_delay) => {}
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Apply every change, continuing past failures
    ///
    /// Returns the number of writes, or the most severe error seen.
    async fn apply(
        &self,
        changes: Vec<Change>,
        cancel: &CancellationToken,
    ) -> Result<usize, ReconcileError> {
        let mut writes = 0;
        let mut failure: Option<ReconcileError> = None;

        for change in changes {
            let kind = change.kind();
            let operation = change.operation();
            let name = change.name().to_string();

            let result = match change {
                Change::CreateConfigMap(c) => {
                    guarded(cancel, self.cluster.create_config_map(c)).await.map(drop)
                }
                Change::UpdateConfigMap(c) => {
                    guarded(cancel, self.cluster.update_config_map(c)).await.map(drop)
                }
                Change::CreateSecret(s) => {
                    guarded(cancel, self.cluster.create_secret(s)).await.map(drop)
                }
                Change::UpdateSecret(s) => {
                    guarded(cancel, self.cluster.update_secret(s)).await.map(drop)
                }
            };

            match result {
                Ok(()) => {
                    writes += 1;
                    metrics::increment_resource_writes(kind.as_str(), operation);
                    info!(kind = %kind, name = %name, operation, "Applied bootstrap resource");
                }
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e) => {
                    warn!(kind = %kind, name = %name, operation, error = %e, "Failed to apply bootstrap resource");
                    failure = Some(match failure {
                        Some(previous) if !previous.is_transient() => previous,
                        _ => e,
                    });
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(writes),
        }
    }

    /// Map a pass outcome to the scheduler result, updating backoff state
    fn handle_outcome(
        &self,
        target: &TargetRef,
        outcome: Result<PassReport, ReconcileError>,
    ) -> ReconcileResult {
        let error = match outcome {
            Ok(PassReport {
                writes,
                upstream_error: None,
            }) => {
                self.reset_backoff(target);
                info!(writes, "Reconciliation succeeded");
                return ReconcileResult::Success;
            }
            Ok(PassReport {
                writes,
                upstream_error: Some(e),
            }) => {
                debug!(writes, "Cluster state applied, Upbound API call failed");
                ReconcileError::Upstream(e)
            }
            Err(ReconcileError::Cancelled) => {
                debug!("Reconciliation cancelled");
                return ReconcileResult::Failed(ReconcileError::Cancelled);
            }
            Err(e) => e,
        };

        metrics::increment_reconciliation_errors();

        if error.is_transient() {
            let delay = self.next_backoff(target);
            metrics::increment_requeues(error.reason());
            warn!(
                error = %error,
                requeue_after_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Transient reconciliation failure, requeueing"
            );
            ReconcileResult::RequeueAfter(delay)
        } else {
            // A fatal error ends the transient streak
            self.reset_backoff(target);
            error!(error = %error, "Reconciliation failed");
            ReconcileResult::Failed(error)
        }
    }
}

/// Run a cluster call unless `cancel` fires first
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReconcileError::Cancelled),
        result = call => result.map_err(ReconcileError::from),
    }
}
