//! Error types for building the HTTP transport.
//!
//! Requests themselves never produce these: every failure of a round-trip is
//! reported as [`localsync_core::platform::FetchError`].

use thiserror::Error;

/// Result type alias for transport construction.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while setting up the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid transport configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
