//! Graph backend contract

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    Direction, Entity, GraphPath, GraphStats, RelatedEdge, ScoredEntity, Subgraph,
};

/// Pluggable graph backend for the long-term tier
///
/// Implementations own their synchronization and durability; callers treat a
/// backend as a thread-safe opaque handle. Scores returned by
/// [`semantic_search`](GraphBackend::semantic_search) are similarities in
/// [0, 1] (higher is closer).
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Insert or update an entity, returning the stored version
    async fn add_entity(&self, entity: Entity) -> Result<Entity>;

    /// Add (or merge) a relationship between two existing entities
    ///
    /// Returns `false` when either endpoint is missing. A relationship with
    /// the same endpoints and type is merged: its properties are replaced.
    async fn add_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        relationship_type: &str,
        properties: Value,
    ) -> Result<bool>;

    /// Fetch an entity by id
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>>;

    /// Find entities by type, case-insensitive name substring, and property equality
    async fn find_entities(
        &self,
        entity_type: Option<&str>,
        name_pattern: Option<&str>,
        property_filters: &[(String, Value)],
        limit: usize,
    ) -> Result<Vec<Entity>>;

    /// Relationships touching an entity, with endpoints resolved
    async fn relationships(
        &self,
        entity_id: &str,
        direction: Direction,
        relationship_type: Option<&str>,
    ) -> Result<Vec<RelatedEdge>>;

    /// Breadth-first traversal from `start_id`, up to `max_depth` hops
    ///
    /// Edges are followed in both directions; `relationship_types`, when
    /// present, restricts which edges may be crossed.
    async fn traverse(
        &self,
        start_id: &str,
        max_depth: usize,
        relationship_types: Option<&[String]>,
    ) -> Result<Subgraph>;

    /// Score entities against a text query
    async fn semantic_search(
        &self,
        query: &str,
        entity_types: Option<&[String]>,
        max_results: usize,
    ) -> Result<Vec<ScoredEntity>>;

    /// Shortest undirected path between two entities, if one exists within `max_depth`
    async fn shortest_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: usize,
    ) -> Result<Option<GraphPath>>;

    /// Delete an entity; with `detach`, its relationships are removed first
    ///
    /// Returns `false` when the entity does not exist. Without `detach`, an
    /// entity that still has relationships is an invalid-input error.
    async fn delete_entity(&self, id: &str, detach: bool) -> Result<bool>;

    /// Aggregate node and relationship counts by type
    async fn statistics(&self) -> Result<GraphStats>;
}
