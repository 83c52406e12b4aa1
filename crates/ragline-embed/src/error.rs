//! Error types for embedding requests.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when calling an embedding provider.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The provider answered 429.
    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Unable to reach the provider.
    #[error("Cannot reach embedding provider at {host}")]
    Unreachable { host: String },

    /// Request timeout.
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// No API key in the configured environment variable.
    #[error("Missing API key: set {var}")]
    MissingApiKey { var: String },

    /// The response did not contain one vector per input.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbedError {
    /// Whether the provider asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmbedError::RateLimited { .. })
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::RateLimited { .. } | EmbedError::Unreachable { .. } | EmbedError::Timeout { .. } => true,
            EmbedError::ApiError { status, .. } => *status >= 500,
            EmbedError::Http(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }
}

/// Result type for embedding operations.
pub type EmbedResult<T> = Result<T, EmbedError>;
