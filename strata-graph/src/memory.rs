//! In-memory knowledge graph
//!
//! A complete [`GraphBackend`] implementation backed by hash maps under a
//! single `parking_lot::RwLock`. Suitable for tests, development, and small
//! deployments that do not run an external graph database.
//!
//! Traversal and shortest-path queries are breadth-first over an adjacency
//! index kept alongside the entity and relationship maps; semantic search is
//! tiered string matching over names and properties (exact name 1.0, name
//! prefix 0.8, substring anywhere 0.5).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{GraphError, Result};
use crate::traits::GraphBackend;
use crate::types::{
    Direction, Entity, GraphPath, GraphStats, RelatedEdge, Relationship, ScoredEntity, Subgraph,
};

#[derive(Default)]
struct GraphInner {
    entities: HashMap<String, Entity>,
    relationships: HashMap<String, Relationship>,
    /// Entity id -> relationship ids where the entity is the source
    outgoing: HashMap<String, Vec<String>>,
    /// Entity id -> relationship ids where the entity is the target
    incoming: HashMap<String, Vec<String>>,
}

impl GraphInner {
    /// Relationship ids touching `id` in the requested direction
    fn edge_ids(&self, id: &str, direction: Direction) -> Vec<String> {
        let mut ids = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(out) = self.outgoing.get(id) {
                ids.extend(out.iter().cloned());
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(inc) = self.incoming.get(id) {
                ids.extend(inc.iter().cloned());
            }
        }
        ids
    }

    fn neighbors(
        &self,
        id: &str,
        relationship_types: Option<&[String]>,
    ) -> Vec<(String, String)> {
        // (neighbor entity id, relationship id), both directions
        self.edge_ids(id, Direction::Both)
            .into_iter()
            .filter_map(|rel_id| {
                let rel = self.relationships.get(&rel_id)?;
                if let Some(types) = relationship_types {
                    if !types.iter().any(|t| t == &rel.relationship_type) {
                        return None;
                    }
                }
                let neighbor = if rel.from_entity == id {
                    rel.to_entity.clone()
                } else {
                    rel.from_entity.clone()
                };
                Some((neighbor, rel_id))
            })
            .collect()
    }
}

/// Thread-safe in-memory graph backend
#[derive(Clone, Default)]
pub struct InMemoryGraph {
    inner: Arc<RwLock<GraphInner>>,
}

impl InMemoryGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities currently stored
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.inner.read().entities.len()
    }

    fn match_score(entity: &Entity, needle: &str) -> Option<f64> {
        let name = entity.name.to_lowercase();
        if name == needle {
            return Some(1.0);
        }
        if name.starts_with(needle) {
            return Some(0.8);
        }
        if name.contains(needle) {
            return Some(0.5);
        }
        // Fall back to property text
        let props = entity.properties.to_string().to_lowercase();
        if props.contains(needle) {
            return Some(0.5);
        }
        None
    }
}

impl std::fmt::Debug for InMemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("InMemoryGraph")
            .field("entities", &inner.entities.len())
            .field("relationships", &inner.relationships.len())
            .finish()
    }
}

#[async_trait]
impl GraphBackend for InMemoryGraph {
    async fn add_entity(&self, entity: Entity) -> Result<Entity> {
        if entity.name.is_empty() {
            return Err(GraphError::InvalidInput(
                "entity name must be non-empty".to_string(),
            ));
        }
        let mut inner = self.inner.write();
        debug!(id = %entity.id, name = %entity.name, "adding entity");
        inner.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn add_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        relationship_type: &str,
        properties: Value,
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        if !inner.entities.contains_key(from_id) || !inner.entities.contains_key(to_id) {
            trace!(from_id, to_id, "relationship endpoint missing");
            return Ok(false);
        }

        // Merge semantics: same endpoints and type replaces properties
        let existing = inner
            .outgoing
            .get(from_id)
            .into_iter()
            .flatten()
            .find(|rel_id| {
                inner.relationships.get(*rel_id).is_some_and(|r| {
                    r.to_entity == to_id && r.relationship_type == relationship_type
                })
            })
            .cloned();

        if let Some(rel_id) = existing {
            if let Some(rel) = inner.relationships.get_mut(&rel_id) {
                rel.properties = properties;
            }
            return Ok(true);
        }

        let rel = Relationship::new(
            from_id.to_string(),
            to_id.to_string(),
            relationship_type.to_string(),
            properties,
        );
        let rel_id = rel.id.clone();
        inner
            .outgoing
            .entry(from_id.to_string())
            .or_default()
            .push(rel_id.clone());
        inner
            .incoming
            .entry(to_id.to_string())
            .or_default()
            .push(rel_id.clone());
        inner.relationships.insert(rel_id, rel);
        debug!(from_id, to_id, relationship_type, "added relationship");
        Ok(true)
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.inner.read().entities.get(id).cloned())
    }

    async fn find_entities(
        &self,
        entity_type: Option<&str>,
        name_pattern: Option<&str>,
        property_filters: &[(String, Value)],
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let inner = self.inner.read();
        let pattern = name_pattern.map(str::to_lowercase);

        let mut matches: Vec<Entity> = inner
            .entities
            .values()
            .filter(|e| entity_type.is_none_or(|t| e.entity_type == t))
            .filter(|e| {
                pattern
                    .as_deref()
                    .is_none_or(|p| e.name.to_lowercase().contains(p))
            })
            .filter(|e| {
                property_filters
                    .iter()
                    .all(|(key, value)| e.properties.get(key) == Some(value))
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn relationships(
        &self,
        entity_id: &str,
        direction: Direction,
        relationship_type: Option<&str>,
    ) -> Result<Vec<RelatedEdge>> {
        let inner = self.inner.read();
        let edges = inner
            .edge_ids(entity_id, direction)
            .into_iter()
            .filter_map(|rel_id| {
                let rel = inner.relationships.get(&rel_id)?;
                if relationship_type.is_some_and(|t| t != rel.relationship_type) {
                    return None;
                }
                let source = inner.entities.get(&rel.from_entity)?.clone();
                let target = inner.entities.get(&rel.to_entity)?.clone();
                Some(RelatedEdge {
                    source,
                    target,
                    relationship: rel.clone(),
                })
            })
            .collect();
        Ok(edges)
    }

    async fn traverse(
        &self,
        start_id: &str,
        max_depth: usize,
        relationship_types: Option<&[String]>,
    ) -> Result<Subgraph> {
        let inner = self.inner.read();
        let Some(start) = inner.entities.get(start_id) else {
            return Ok(Subgraph::default());
        };

        let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
        let mut crossed: HashSet<String> = HashSet::new();
        let mut nodes = vec![start.clone()];
        let mut relationships = Vec::new();
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(start_id.to_string(), 0)]);

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (neighbor, rel_id) in inner.neighbors(&current, relationship_types) {
                if crossed.insert(rel_id.clone()) {
                    if let Some(rel) = inner.relationships.get(&rel_id) {
                        relationships.push(rel.clone());
                    }
                }
                if visited.insert(neighbor.clone()) {
                    if let Some(entity) = inner.entities.get(&neighbor) {
                        nodes.push(entity.clone());
                    }
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }

        trace!(
            start_id,
            nodes = nodes.len(),
            relationships = relationships.len(),
            "traversal complete"
        );
        Ok(Subgraph {
            nodes,
            relationships,
        })
    }

    async fn semantic_search(
        &self,
        query: &str,
        entity_types: Option<&[String]>,
        max_results: usize,
    ) -> Result<Vec<ScoredEntity>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let needle = query.to_lowercase();
        let inner = self.inner.read();

        let mut scored: Vec<ScoredEntity> = inner
            .entities
            .values()
            .filter(|e| {
                entity_types.is_none_or(|types| types.iter().any(|t| t == &e.entity_type))
            })
            .filter_map(|e| {
                Self::match_score(e, &needle).map(|score| ScoredEntity {
                    entity: e.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.name.cmp(&b.entity.name))
        });
        scored.truncate(max_results);
        Ok(scored)
    }

    async fn shortest_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: usize,
    ) -> Result<Option<GraphPath>> {
        let inner = self.inner.read();
        if !inner.entities.contains_key(from_id) || !inner.entities.contains_key(to_id) {
            return Ok(None);
        }
        if from_id == to_id {
            let entity = inner.entities[from_id].clone();
            return Ok(Some(GraphPath {
                entities: vec![entity],
                relationships: Vec::new(),
            }));
        }

        // BFS with predecessor tracking, edges followed in both directions
        let mut predecessor: HashMap<String, (String, String)> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([from_id.to_string()]);
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(from_id.to_string(), 0)]);
        let mut found = false;

        'outer: while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (neighbor, rel_id) in inner.neighbors(&current, None) {
                if visited.insert(neighbor.clone()) {
                    predecessor.insert(neighbor.clone(), (current.clone(), rel_id));
                    if neighbor == to_id {
                        found = true;
                        break 'outer;
                    }
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }

        if !found {
            return Ok(None);
        }

        // Reconstruct the path backwards from the target
        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        let mut cursor = to_id.to_string();
        entities.push(inner.entities[&cursor].clone());
        while let Some((prev, rel_id)) = predecessor.get(&cursor) {
            relationships.push(inner.relationships[rel_id].clone());
            entities.push(inner.entities[prev].clone());
            cursor = prev.clone();
        }
        entities.reverse();
        relationships.reverse();

        Ok(Some(GraphPath {
            entities,
            relationships,
        }))
    }

    async fn delete_entity(&self, id: &str, detach: bool) -> Result<bool> {
        let mut inner = self.inner.write();
        if !inner.entities.contains_key(id) {
            return Ok(false);
        }

        let touching = inner.edge_ids(id, Direction::Both);
        if !touching.is_empty() && !detach {
            return Err(GraphError::InvalidInput(format!(
                "entity {id} still has {} relationships; delete with detach",
                touching.len()
            )));
        }

        for rel_id in touching {
            if let Some(rel) = inner.relationships.remove(&rel_id) {
                if let Some(out) = inner.outgoing.get_mut(&rel.from_entity) {
                    out.retain(|r| r != &rel_id);
                }
                if let Some(inc) = inner.incoming.get_mut(&rel.to_entity) {
                    inc.retain(|r| r != &rel_id);
                }
            }
        }
        inner.outgoing.remove(id);
        inner.incoming.remove(id);
        inner.entities.remove(id);
        debug!(id, "deleted entity");
        Ok(true)
    }

    async fn statistics(&self) -> Result<GraphStats> {
        let inner = self.inner.read();
        let mut stats = GraphStats {
            total_nodes: inner.entities.len(),
            total_relationships: inner.relationships.len(),
            ..GraphStats::default()
        };
        for entity in inner.entities.values() {
            *stats
                .nodes_by_type
                .entry(entity.entity_type.clone())
                .or_default() += 1;
        }
        for rel in inner.relationships.values() {
            *stats
                .relationships_by_type
                .entry(rel.relationship_type.clone())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seed() -> (InMemoryGraph, Vec<String>) {
        let graph = InMemoryGraph::new();
        let mut ids = Vec::new();
        for (name, kind) in [
            ("Rust", "technology"),
            ("Qdrant", "technology"),
            ("Alice", "person"),
            ("Memory Safety", "concept"),
        ] {
            let entity = graph
                .add_entity(Entity::new(
                    name.to_string(),
                    kind.to_string(),
                    json!({"origin": "test"}),
                ))
                .await
                .unwrap();
            ids.push(entity.id);
        }
        // Rust -> Memory Safety, Alice -> Rust, Qdrant -> Rust
        graph
            .add_relationship(&ids[0], &ids[3], "guarantees", json!({}))
            .await
            .unwrap();
        graph
            .add_relationship(&ids[2], &ids[0], "uses", json!({}))
            .await
            .unwrap();
        graph
            .add_relationship(&ids[1], &ids[0], "written_in", json!({}))
            .await
            .unwrap();
        (graph, ids)
    }

    #[tokio::test]
    async fn add_and_get_entity() {
        let graph = InMemoryGraph::new();
        let entity = graph
            .add_entity(Entity::new(
                "Rust".to_string(),
                "technology".to_string(),
                json!({"paradigm": "systems"}),
            ))
            .await
            .unwrap();

        let fetched = graph.get_entity(&entity.id).await.unwrap();
        assert_eq!(fetched.unwrap().name, "Rust");
        assert!(graph.get_entity("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn relationship_requires_endpoints() {
        let graph = InMemoryGraph::new();
        let created = graph
            .add_relationship("ghost-a", "ghost-b", "uses", json!({}))
            .await
            .unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn relationship_merges_on_same_endpoints_and_type() {
        let (graph, ids) = seed().await;
        let merged = graph
            .add_relationship(&ids[0], &ids[3], "guarantees", json!({"strength": "strong"}))
            .await
            .unwrap();
        assert!(merged);

        let edges = graph
            .relationships(&ids[0], Direction::Out, Some("guarantees"))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(
            edges[0].relationship.properties,
            json!({"strength": "strong"})
        );
    }

    #[tokio::test]
    async fn direction_filters_apply() {
        let (graph, ids) = seed().await;

        let outgoing = graph
            .relationships(&ids[0], Direction::Out, None)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);

        let incoming = graph
            .relationships(&ids[0], Direction::In, None)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 2);

        let both = graph
            .relationships(&ids[0], Direction::Both, None)
            .await
            .unwrap();
        assert_eq!(both.len(), 3);
    }

    #[tokio::test]
    async fn traverse_respects_depth() {
        let (graph, ids) = seed().await;

        let one_hop = graph.traverse(&ids[2], 1, None).await.unwrap();
        // Alice -> Rust
        assert_eq!(one_hop.nodes.len(), 2);
        assert_eq!(one_hop.relationships.len(), 1);

        let two_hops = graph.traverse(&ids[2], 2, None).await.unwrap();
        // Alice -> Rust -> {Memory Safety, Qdrant}
        assert_eq!(two_hops.nodes.len(), 4);
        assert_eq!(two_hops.relationships.len(), 3);
    }

    #[tokio::test]
    async fn traverse_missing_start_is_empty() {
        let (graph, _) = seed().await;
        let subgraph = graph.traverse("missing", 3, None).await.unwrap();
        assert!(subgraph.nodes.is_empty());
    }

    #[tokio::test]
    async fn semantic_search_tiers_scores() {
        let (graph, _) = seed().await;
        let results = graph.semantic_search("rust", None, 10).await.unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].entity.name, "Rust");
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn semantic_search_filters_types() {
        let (graph, _) = seed().await;
        let results = graph
            .semantic_search("rust", Some(&["person".to_string()]), 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn shortest_path_crosses_directions() {
        let (graph, ids) = seed().await;
        // Alice -> Rust -> Memory Safety, two hops
        let path = graph
            .shortest_path(&ids[2], &ids[3], 5)
            .await
            .unwrap()
            .expect("path exists");
        assert_eq!(path.length(), 2);
        assert_eq!(path.entities.first().unwrap().id, ids[2]);
        assert_eq!(path.entities.last().unwrap().id, ids[3]);
    }

    #[tokio::test]
    async fn shortest_path_depth_bound() {
        let (graph, ids) = seed().await;
        let path = graph.shortest_path(&ids[2], &ids[3], 1).await.unwrap();
        assert!(path.is_none());
    }

    #[tokio::test]
    async fn delete_requires_detach_when_connected() {
        let (graph, ids) = seed().await;
        let err = graph.delete_entity(&ids[0], false).await;
        assert!(err.is_err());

        let deleted = graph.delete_entity(&ids[0], true).await.unwrap();
        assert!(deleted);
        assert!(graph.get_entity(&ids[0]).await.unwrap().is_none());

        // Detach removed the edges from both endpoints
        let edges = graph
            .relationships(&ids[3], Direction::Both, None)
            .await
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn statistics_count_by_type() {
        let (graph, _) = seed().await;
        let stats = graph.statistics().await.unwrap();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.total_relationships, 3);
        assert_eq!(stats.nodes_by_type.get("technology"), Some(&2));
        assert_eq!(stats.relationships_by_type.get("uses"), Some(&1));
    }
}
