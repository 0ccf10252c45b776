// ABOUTME: Retrieval pipeline and tier orchestration for the strata context store
// ABOUTME: BM25 keyword index, adaptive chunking, hybrid fusion, and the orchestrator

//! # strata retrieval and orchestration
//!
//! The read and write brains of the context store:
//!
//! - [`BM25Index`]: Okapi BM25 inverted index with IDF floor and filters
//! - [`AdaptiveChunker`]: structure-aware splitting with variable overlap
//! - [`HybridRetriever`]: parallel keyword/vector/graph fan-out with
//!   min-max normalization and weighted score fusion
//! - [`Orchestrator`]: tier routing on write, parallel per-tier search on
//!   read, cross-tier scoring, deduplication, token-budget packing, response
//!   caching, and metrics
//!
//! ## Pipeline
//!
//! 1. **Store** → classify by metadata → write to immediate/session tiers,
//!    enqueue long-term indexing → invalidate the response cache
//! 2. **Retrieve** → cache lookup → per-tier search in parallel → score →
//!    dedup by content hash → sort → pack into the token budget → respond

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod bm25;
pub mod chunker;
pub mod error;
pub mod hybrid;
pub mod orchestrator;
pub mod rerank;
pub mod types;

pub mod prelude;

pub use bm25::BM25Index;
pub use chunker::AdaptiveChunker;
pub use error::{ContextError, Result};
pub use hybrid::HybridRetriever;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStats};
pub use rerank::{NoopReranker, Reranker};
pub use types::{
    BM25Config, Chunk, ChunkerConfig, FusionWeights, HybridConfig, RetrievalMethod,
    RetrievedDocument,
};
