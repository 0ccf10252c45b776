//! Convenience re-exports for downstream crates

pub use crate::error::{CoreError, Result};
pub use crate::filter::{FilterValue, MetadataFilter};
pub use crate::score::{dedup_key, estimate_tokens, jaccard, retrieval_score, word_set, Tier};
pub use crate::types::{
    importance_of, kind_of, persistence_of, task_id_of, ContentKind, ContextItem, ContextRequest,
    ContextResponse, Importance, Metadata, MetadataValue, Persistence, RetrievalStrategy,
};
