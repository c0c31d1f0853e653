//! Errors crossing the chat boundary.

use std::time::Duration;
use thiserror::Error;

/// Failure of a chat request.
///
/// A generator retries infrastructure failures for which
/// [`is_retryable`](Self::is_retryable) holds; everything else ends the run.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Non-success HTTP status from the provider.
    #[error("HTTP error: {status} - {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Provider-level error payload.
    #[error("API error: {message}")]
    Api {
        /// Error message.
        message: String,
        /// Provider error code.
        code: Option<String>,
    },

    /// The request timed out.
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// The provider asked us to slow down.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested delay.
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The connection failed or dropped mid-stream.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The response could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The model cannot do what was asked.
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// The prompt does not fit the context window.
    #[error("Context length exceeded: {max_tokens} tokens max, got {requested_tokens}")]
    ContextLengthExceeded {
        /// Maximum allowed tokens.
        max_tokens: u64,
        /// Requested tokens.
        requested_tokens: u64,
    },

    /// The request was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModelError {
    /// Check if retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Connection(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Delay the provider asked for, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            code: None,
        }
    }

    /// Create an API error with a provider code.
    pub fn api_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Create an HTTP error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a rate limited error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ModelError::Timeout(Duration::from_secs(30)), true)]
    #[case(ModelError::rate_limited(None), true)]
    #[case(ModelError::connection("reset by peer"), true)]
    #[case(ModelError::http(503, "unavailable"), true)]
    #[case(ModelError::http(429, "slow down"), true)]
    #[case(ModelError::http(400, "bad request"), false)]
    #[case(ModelError::Authentication("bad key".into()), false)]
    #[case(ModelError::api("nope"), false)]
    #[case(ModelError::Cancelled, false)]
    fn test_is_retryable(#[case] err: ModelError, #[case] expected: bool) {
        assert_eq!(err.is_retryable(), expected, "{err}");
    }

    #[test]
    fn test_retry_after() {
        let err = ModelError::rate_limited(Some(Duration::from_secs(2)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(ModelError::Timeout(Duration::ZERO).retry_after(), None);
    }

    #[test]
    fn test_display() {
        let err = ModelError::api_with_code("quota", "insufficient_quota");
        assert_eq!(err.to_string(), "API error: quota");
        assert_eq!(ModelError::http(502, "bad gateway").to_string(), "HTTP error: 502 - bad gateway");
    }
}
