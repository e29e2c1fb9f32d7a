//! Client error types.

/// Errors that can occur when using the tollgate client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The key was missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The ledger is temporarily unavailable; retry later.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized | Self::Serialization(_) | Self::Configuration(_) => false,
        }
    }
}
