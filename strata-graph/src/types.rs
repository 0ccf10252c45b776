//! Core types for the knowledge graph

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An entity node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    /// Unique identifier
    pub id: String,

    /// Entity name/label (e.g., "Rust", "Qdrant")
    pub name: String,

    /// Entity type/category (e.g., `technology`, `person`, `concept`)
    pub entity_type: String,

    /// Additional properties as JSON
    pub properties: Value,

    /// When the entity was created in this store
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity with an auto-generated id
    #[must_use]
    pub fn new(name: String, entity_type: String, properties: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            entity_type,
            properties,
            created_at: Utc::now(),
        }
    }

    /// Create an entity with an explicit id
    #[must_use]
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

/// A directed relationship between two entities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    /// Unique identifier
    pub id: String,

    /// Source entity id
    pub from_entity: String,

    /// Target entity id
    pub to_entity: String,

    /// Relationship type (e.g., `uses`, `works_at`, `caused_by`)
    pub relationship_type: String,

    /// Additional properties as JSON
    pub properties: Value,

    /// When the relationship was created in this store
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship with an auto-generated id
    #[must_use]
    pub fn new(
        from_entity: String,
        to_entity: String,
        relationship_type: String,
        properties: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_entity,
            to_entity,
            relationship_type,
            properties,
            created_at: Utc::now(),
        }
    }
}

/// Direction selector for relationship queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Relationships where the entity is the source
    Out,
    /// Relationships where the entity is the target
    In,
    /// Both directions
    Both,
}

/// An edge returned from a relationship query, with both endpoints resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEdge {
    /// Source entity
    pub source: Entity,
    /// Target entity
    pub target: Entity,
    /// The relationship itself
    pub relationship: Relationship,
}

/// A subgraph produced by traversal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    /// Distinct nodes reached
    pub nodes: Vec<Entity>,
    /// Distinct relationships crossed
    pub relationships: Vec<Relationship>,
}

/// An entity with a search score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    /// The matched entity
    pub entity: Entity,
    /// Match score in [0, 1]
    pub score: f64,
}

/// A path between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPath {
    /// Entities along the path, endpoints included
    pub entities: Vec<Entity>,
    /// Relationships crossed, in path order
    pub relationships: Vec<Relationship>,
}

impl GraphPath {
    /// Number of hops in the path
    #[must_use]
    pub fn length(&self) -> usize {
        self.relationships.len()
    }
}

/// Aggregate statistics over the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Node counts keyed by entity type
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Relationship counts keyed by relationship type
    pub relationships_by_type: BTreeMap<String, usize>,
    /// Total node count
    pub total_nodes: usize,
    /// Total relationship count
    pub total_relationships: usize,
}
