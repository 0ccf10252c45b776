//! Error types shared across the store

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the context store
///
/// Capacity pressure and cache staleness are handled internally by eviction
/// and invalidation and never appear here. Optional-backend failures degrade
/// to empty component results and are reported through response metadata, not
/// through this type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request or empty content where not allowed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector or graph backend offline
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend call exceeded its deadline
    #[error("Backend timeout: {0}")]
    BackendTimeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}
