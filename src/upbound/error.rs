//! Upbound API error taxonomy.

use reqwest::StatusCode;
use thiserror::Error;

/// Longest error body carried into an error message
const MAX_ERROR_BODY_LEN: usize = 256;

/// Failure talking to the Upbound API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Transport error, timeout, 5xx or 429 response
    #[error("Upbound API unreachable: {0}")]
    Unreachable(String),

    /// 401/403: the control plane token was refused
    #[error("Upbound API refused the control plane token (HTTP {status})")]
    Unauthorized { status: u16 },

    /// 2xx response whose body does not decode or has empty fields
    #[error("malformed Upbound API response: {0}")]
    MalformedResponse(String),

    /// Any other 4xx response
    #[error("Upbound API rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Shutdown observed while waiting on the API
    #[error("Upbound API request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Whether retrying the same request later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Label used for the upstream request metric
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Unauthorized { .. } => "unauthorized",
            Self::MalformedResponse(_) => "malformed",
            Self::Rejected { .. } => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Condition reason surfaced on the identity ConfigMap
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "UpstreamUnreachable",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::MalformedResponse(_) => "MalformedResponse",
            Self::Rejected { .. } => "UpstreamRejected",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Map a non-success HTTP status to an error
    ///
    /// Returns `None` for 2xx statuses.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        let code = status.as_u16();
        let error = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { status: code },
            StatusCode::TOO_MANY_REQUESTS => Self::Unreachable(format!("HTTP {code}: throttled")),
            s if s.is_server_error() => {
                Self::Unreachable(format!("HTTP {code}: {}", truncate(body)))
            }
            _ => Self::Rejected {
                status: code,
                message: truncate(body),
            },
        };
        Some(error)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Unreachable(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
