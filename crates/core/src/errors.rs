//! Error types shared by the platform coordination layer.

use thiserror::Error;

pub use crate::platform::FetchError;

/// Result type alias for platform coordination operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced above the lock and lifecycle primitives.
///
/// The primitives themselves have narrow failure channels: lock acquisition
/// reports a plain `bool`, the worker lock never fails, and the transport
/// collapses every network failure into [`FetchError`].
#[derive(Debug, Error)]
pub enum Error {
    /// The sync endpoint could not be reached
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Local I/O error (lock files and the like)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The surrounding client failed to reset its sync state
    #[error("Reset failed: {0}")]
    Reset(String),

    /// A sync round failed for a reason owned by the sync engine
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a reset error
    pub fn reset(message: impl Into<String>) -> Self {
        Self::Reset(message.into())
    }

    /// Create a sync error
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the failure came from the network layer and the next
    /// trigger is expected to retry.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
