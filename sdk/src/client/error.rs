//! Client error types.
//!
//! Provides error types for HTTP client operations.

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Failed to deserialize response.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// L2 returned an error response.
    #[error("API error [{code}]: {message}")]
    Api {
        /// Error code or HTTP status.
        code: String,
        /// Error message.
        message: String,
    },

    /// Rate limited (429).
    #[error("rate limited{}", retry_suffix(.retry_after))]
    RateLimited {
        /// Retry after seconds.
        retry_after: Option<u64>,
    },

    /// Resource or endpoint not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Unauthorized (401).
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(", retry after {} seconds", secs))
        .unwrap_or_default()
}

impl ClientError {
    /// Returns true if the endpoint itself is absent on the server.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}
