//! Error types for agentpulse-core

use thiserror::Error;

/// Main error type for the agentpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted after shutdown
    #[error("pipeline stopped")]
    Stopped,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure surfaced to the caller
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for agentpulse-core
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure from a delivery attempt.
///
/// The variant decides retry behavior: transient conditions (network,
/// timeout, 429, 5xx) are retried with backoff, everything else is
/// permanent and dropped after a single attempt.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("network error: {message}")]
    Network { message: String },

    /// Request exceeded the configured timeout
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP 4xx other than 429
    #[error("client error: HTTP {status}")]
    Client { status: u16, body: String },

    /// HTTP 5xx
    #[error("server error: HTTP {status}")]
    Server { status: u16, body: String },

    /// HTTP 429 with optional Retry-After guidance
    #[error("rate limited by collector")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Response body did not match the expected shape
    #[error("invalid collector response: {message}")]
    InvalidResponse { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn timeout(timeout_secs: u64) -> Self {
        Self::Timeout { timeout_secs }
    }

    pub fn client(status: u16, body: impl Into<String>) -> Self {
        Self::Client { status, body: body.into() }
    }

    pub fn server(status: u16, body: impl Into<String>) -> Self {
        Self::Server { status, body: body.into() }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Whether this failure is transient and worth retrying.
    ///
    /// Network failures, timeouts, rate limits, and server errors (5xx)
    /// are retryable. Client errors (4xx) and malformed responses are
    /// permanent: retrying the same payload cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Server { .. }
            | Self::RateLimited { .. } => true,

            Self::Client { .. } | Self::InvalidResponse { .. } => false,
        }
    }

    /// HTTP status code, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Server-requested wait before the next attempt, for rate limits.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}
