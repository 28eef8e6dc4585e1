//! Provider error types.

use reqwest::StatusCode;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level or server-side failure that may succeed on retry.
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// Non-retryable HTTP status.
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider-level error code inside a 200 response.
    #[error("Provider error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn empty_response(msg: impl Into<String>) -> Self {
        Self::EmptyResponse(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedOutput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify an unsuccessful HTTP status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = truncate(body, MAX_ERROR_BODY);
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(format!("HTTP {}: {}", status.as_u16(), body))
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Self::Transient(format!("HTTP {}: {}", status.as_u16(), body))
        } else {
            Self::Status {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Network-transient failure: connect/timeout errors, 5xx and 408.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_rate_limited());
        assert!(ProviderError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(ProviderError::from_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());

        let err = ProviderError::from_status(StatusCode::BAD_REQUEST, "bad prompt");
        assert!(!err.is_transient());
        assert!(!err.is_rate_limited());
        assert!(matches!(err, ProviderError::Status { status: 400, .. }));
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(2000);
        match ProviderError::from_status(StatusCode::FORBIDDEN, &body) {
            ProviderError::Status { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY + 3),
            other => panic!("unexpected: {other}"),
        }
    }
}
