//! Error types for the retrieval pipeline

use thiserror::Error;

/// Result type for retrieval and orchestration operations
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors that can occur in the retrieval pipeline and orchestrator
///
/// Optional-backend failures never appear here: the retriever degrades to
/// empty component results and records the failure in response metadata.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Malformed request or empty content where not allowed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Retrieval failed
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Memory tier error
    #[error("Memory error: {0}")]
    Memory(String),

    /// Graph backend error
    #[error("Graph error: {0}")]
    Graph(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<strata_memory::MemoryError> for ContextError {
    fn from(err: strata_memory::MemoryError) -> Self {
        Self::Memory(err.to_string())
    }
}

impl From<strata_graph::GraphError> for ContextError {
    fn from(err: strata_graph::GraphError) -> Self {
        Self::Graph(err.to_string())
    }
}
