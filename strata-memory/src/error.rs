//! Error types for the memory tiers

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur in the memory tiers and backends
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector backend error
    #[error("Vector backend error: {0}")]
    VectorBackend(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<String> for MemoryError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for MemoryError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}
