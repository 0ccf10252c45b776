//! # Memory tiers for strata
//!
//! The two in-memory tiers of the context store, plus the vector backend
//! contract used by the long-term tier:
//!
//! - [`ImmediateBuffer`]: bounded FIFO hot cache with lazy TTL expiry
//! - [`SessionStore`]: bounded working set with importance-weighted eviction,
//!   per-conversation and per-task indices, and optional consolidation
//! - [`VectorBackend`]: embedding-based nearest-neighbor contract with a
//!   complete in-memory implementation
//! - [`Embedder`]: text-to-vector contract with a deterministic hashing
//!   embedder and an LRU-cached wrapper
//!
//! Each tier owns exactly one lock; callers never hold two tier locks at
//! once. Backends own their own synchronization.

pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod immediate;
pub mod session;
pub mod vector;

pub mod prelude;

pub use consolidation::{Summarizer, TimelineSummarizer};
pub use embeddings::{CachedEmbedder, Embedder, HashEmbedder};
pub use error::{MemoryError, Result};
pub use immediate::{BufferMetrics, ImmediateBuffer};
pub use session::{SessionConfig, SessionStats, SessionStore};
pub use vector::{InMemoryVectorStore, VectorBackend, VectorDocument, VectorMatch};
