//! # Core types for the strata context store
//!
//! This crate defines the value types shared by every memory tier and the
//! retrieval pipeline:
//!
//! - [`ContextItem`]: the atomic unit of stored context, with typed metadata
//! - [`ContextRequest`] / [`ContextResponse`]: the retrieval contract
//! - [`MetadataFilter`]: the filter predicate honored by all searchable tiers
//! - Scoring primitives: importance table, retrieval score, token estimation,
//!   and the content-hash deduplication key
//!
//! The crate is deliberately free of async machinery and storage; those live
//! in `strata-memory`, `strata-graph`, and `strata-context`.

pub mod error;
pub mod filter;
pub mod score;
pub mod types;

pub mod prelude;

// Re-exports for convenience
pub use error::{CoreError, Result};
pub use filter::{FilterValue, MetadataFilter};
pub use score::{dedup_key, estimate_tokens, jaccard, retrieval_score, Tier};
pub use types::{
    ContentKind, ContextItem, ContextRequest, ContextResponse, Importance, Metadata,
    MetadataValue, Persistence, RetrievalStrategy,
};
