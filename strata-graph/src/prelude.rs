//! Convenience re-exports

pub use crate::error::{GraphError, Result};
pub use crate::memory::InMemoryGraph;
pub use crate::traits::GraphBackend;
pub use crate::types::{
    Direction, Entity, GraphPath, GraphStats, RelatedEdge, Relationship, ScoredEntity, Subgraph,
};
