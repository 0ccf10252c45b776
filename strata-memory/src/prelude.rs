//! Convenience re-exports

pub use crate::consolidation::{Summarizer, TimelineSummarizer};
pub use crate::embeddings::{cosine_similarity, CachedEmbedder, Embedder, HashEmbedder};
pub use crate::error::{MemoryError, Result};
pub use crate::immediate::{BufferMetrics, ImmediateBuffer};
pub use crate::session::{SessionConfig, SessionStats, SessionStore};
pub use crate::vector::{InMemoryVectorStore, VectorBackend, VectorDocument, VectorMatch};
