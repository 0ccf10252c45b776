//! # Knowledge graph backend for strata
//!
//! The long-term tier can attach a graph backend for entity and relationship
//! retrieval. This crate defines the [`GraphBackend`] contract and ships a
//! complete thread-safe in-memory implementation used for tests, development,
//! and deployments that do not run an external graph database.
//!
//! Real backends (Neo4j and friends) implement the same trait; the
//! orchestrator treats every implementation as an opaque thread-safe handle
//! and degrades gracefully when the backend is absent or failing.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub mod prelude;

pub use error::{GraphError, Result};
pub use memory::InMemoryGraph;
pub use traits::GraphBackend;
pub use types::{
    Direction, Entity, GraphPath, GraphStats, RelatedEdge, Relationship, ScoredEntity, Subgraph,
};
