//! # Upbound API Client
//!
//! REST client for the Upbound API.
//! Uses reqwest with rustls; one connection pool is shared across reconciliation passes.
//!
//! Endpoints:
//! - `GET {base}/v1/gw/certs` - gateway public certificates, authenticated with
//!   the control plane token as a bearer token

mod error;
mod responses;

pub use error::ApiError;
pub use responses::PublicCerts;

use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capability the reconciler needs from the upstream control plane
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Fetch the gateway public certificates using the control plane token
    async fn gateway_certs(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<PublicCerts, ApiError>;
}

/// Upbound API client bound to a base URL
#[derive(Clone)]
pub struct UpboundClient {
    http_client: Client,
    base_url: String,
    debug: bool,
}

impl std::fmt::Debug for UpboundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpboundClient")
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl UpboundClient {
    /// Create a client for `base_url`
    ///
    /// With `debug` set, request URLs, response statuses and bodies are logged.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: &str, debug: bool, request_timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            debug,
        })
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_certs(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<PublicCerts, ApiError> {
        let url = format!("{}/v1/gw/certs", self.base_url);
        if self.debug {
            debug!(url = %url, "Requesting gateway public certificates");
        }

        let request = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ApiError::Cancelled),
            body = response.text() => body?,
        };

        if self.debug {
            debug!(url = %url, status = status.as_u16(), body = %body, "Upbound API response");
        }

        if let Some(error) = ApiError::from_status(status, &body) {
            return Err(error);
        }

        PublicCerts::from_body(&body)
    }
}

#[async_trait]
impl UpstreamApi for UpboundClient {
    async fn gateway_certs(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<PublicCerts, ApiError> {
        let start = std::time::Instant::now();
        let result = self.fetch_certs(token, cancel).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_upstream_request(outcome, start.elapsed().as_secs_f64());

        result
    }
}
