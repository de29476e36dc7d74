//! Upbound API response bodies.

use super::ApiError;
use serde::{Deserialize, Serialize};

/// Gateway public certificates returned by `GET /v1/gw/certs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCerts {
    /// PEM encoded public key used to verify gateway-issued JWTs
    pub jwt_public_key: String,
    /// PEM encoded CA bundle of the NATS endpoint
    pub nats_ca: String,
}

impl PublicCerts {
    /// Decode a response body, rejecting missing or empty fields
    ///
    /// # Errors
    /// Returns [`ApiError::MalformedResponse`] if the body is not valid
    pub fn from_body(body: &str) -> Result<Self, ApiError> {
        let certs: Self = serde_json::from_str(body)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

        if certs.jwt_public_key.trim().is_empty() {
            return Err(ApiError::MalformedResponse(
                "jwt_public_key is empty".to_string(),
            ));
        }
        if certs.nats_ca.trim().is_empty() {
            return Err(ApiError::MalformedResponse("nats_ca is empty".to_string()));
        }

        Ok(certs)
    }
}
