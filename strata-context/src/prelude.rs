//! Convenience re-exports

pub use crate::bm25::{tokenize, BM25Index};
pub use crate::chunker::AdaptiveChunker;
pub use crate::error::{ContextError, Result};
pub use crate::hybrid::HybridRetriever;
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStats};
pub use crate::rerank::{NoopReranker, Reranker};
pub use crate::types::{
    BM25Config, Chunk, ChunkerConfig, FusionWeights, HybridConfig, RetrievalMethod,
    RetrievedDocument,
};
