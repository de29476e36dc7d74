//! # Bootstrap Options
//!
//! Options of the `bootstrap` command, validated before the runtime host starts.

use crate::constants::{DEFAULT_NAMESPACE, DEFAULT_UPBOUND_API_URL};
use std::time::Duration;
use thiserror::Error;

/// Invalid bootstrap configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sync period must be greater than zero")]
    ZeroSyncPeriod,
    #[error("invalid namespace '{0}': must be a lowercase RFC 1123 label of at most 63 characters")]
    InvalidNamespace(String),
    #[error("invalid Upbound API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

/// Options for one bootstrapper process
///
/// Created once from the command line and passed by value into the runtime host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Maximum interval between forced re-reconciliations
    pub sync_period: Duration,
    /// Namespace that scopes every watch, read and write
    pub namespace: String,
    /// Base URL of the Upbound API
    pub upbound_api_url: String,
    /// Verbose logging, including upstream request/response bodies
    pub debug: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(600),
            namespace: DEFAULT_NAMESPACE.to_string(),
            upbound_api_url: DEFAULT_UPBOUND_API_URL.to_string(),
            debug: false,
        }
    }
}

impl BootstrapOptions {
    /// Check the options, returning the first problem found
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the invalid option
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_period.is_zero() {
            return Err(ConfigError::ZeroSyncPeriod);
        }

        if !is_dns_label(&self.namespace) {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }

        let url = reqwest::Url::parse(&self.upbound_api_url).map_err(|e| {
            ConfigError::InvalidApiUrl {
                url: self.upbound_api_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidApiUrl {
                url: self.upbound_api_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidApiUrl {
                url: self.upbound_api_url.clone(),
                reason: "missing host".to_string(),
            });
        }

        Ok(())
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    bytes.first().is_some_and(alnum)
        && bytes.last().is_some_and(alnum)
        && bytes.iter().all(|b| alnum(b) || *b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = BootstrapOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert_eq!(options.namespace, "upbound-system");
        assert_eq!(options.upbound_api_url, "https://api.upbound.io");
        assert_eq!(options.sync_period, Duration::from_secs(600));
    }

    #[test]
    fn test_zero_sync_period_rejected() {
        let options = BootstrapOptions {
            sync_period: Duration::ZERO,
            ..BootstrapOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::ZeroSyncPeriod));
    }

    #[test]
    fn test_namespace_rules() {
        for bad in ["", "Upbound", "-upbound", "upbound-", "up_bound", &"a".repeat(64)] {
            let options = BootstrapOptions {
                namespace: bad.to_string(),
                ..BootstrapOptions::default()
            };
            assert!(
                matches!(options.validate(), Err(ConfigError::InvalidNamespace(_))),
                "namespace '{bad}' should be rejected"
            );
        }

        let options = BootstrapOptions {
            namespace: "crossplane-system-2".to_string(),
            ..BootstrapOptions::default()
        };
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn test_api_url_rules() {
        for bad in ["api.upbound.io", "ftp://api.upbound.io", "https://", "not a url"] {
            let options = BootstrapOptions {
                upbound_api_url: bad.to_string(),
                ..BootstrapOptions::default()
            };
            assert!(
                matches!(options.validate(), Err(ConfigError::InvalidApiUrl { .. })),
                "url '{bad}' should be rejected"
            );
        }

        let options = BootstrapOptions {
            upbound_api_url: "http://127.0.0.1:8080".to_string(),
            ..BootstrapOptions::default()
        };
        assert_eq!(options.validate(), Ok(()));
    }
}
