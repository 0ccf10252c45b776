//! Hybrid retrieval: parallel fan-out and weighted score fusion
//!
//! Coordinates the three long-term components (BM25 keyword search, vector
//! similarity, graph traversal) and fuses their results:
//!
//! 1. Each component runs in parallel with a `max_results · 2` budget
//! 2. Each component's scores are min-max normalized into [0, 1]
//!    (a degenerate range collapses to 1.0)
//! 3. Normalized scores accumulate into a per-document weighted sum, with
//!    per-component scores retained on the result
//! 4. An optional reranker reorders the fused top slice
//!
//! A failing or absent backend contributes an empty component list; the
//! failure is reported alongside the results, never as an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use strata_core::types::{Metadata, MetadataValue, RetrievalStrategy};
use strata_core::MetadataFilter;
use strata_graph::{Direction, GraphBackend};
use strata_memory::{VectorBackend, VectorDocument};

use crate::bm25::BM25Index;
use crate::chunker::AdaptiveChunker;
use crate::error::Result;
use crate::rerank::Reranker;
use crate::types::{ChunkerConfig, HybridConfig, RetrievalMethod, RetrievedDocument};

/// How many relationship lines a graph result folds into its content
const GRAPH_CONTEXT_EDGES: usize = 5;

/// Fan-out coordinator over the long-term retrieval components
pub struct HybridRetriever {
    bm25: Arc<BM25Index>,
    chunker: AdaptiveChunker,
    chunk_threshold: usize,
    vector: Option<Arc<dyn VectorBackend>>,
    graph: Option<Arc<dyn GraphBackend>>,
    reranker: Option<Arc<dyn Reranker>>,
    config: HybridConfig,
}

impl HybridRetriever {
    /// Create a retriever with only the BM25 component attached
    #[must_use]
    pub fn new(config: HybridConfig) -> Self {
        let chunker_config = ChunkerConfig::default();
        Self {
            bm25: Arc::new(BM25Index::new()),
            chunker: AdaptiveChunker::with_config(chunker_config),
            chunk_threshold: chunker_config.chunk_size,
            vector: None,
            graph: None,
            reranker: None,
            config,
        }
    }

    /// Attach a vector backend
    #[must_use]
    pub fn with_vector_backend(mut self, backend: Arc<dyn VectorBackend>) -> Self {
        self.vector = Some(backend);
        self
    }

    /// Attach a graph backend
    #[must_use]
    pub fn with_graph_backend(mut self, backend: Arc<dyn GraphBackend>) -> Self {
        self.graph = Some(backend);
        self
    }

    /// Attach a reranker (applied when the configuration enables reranking)
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Use a custom chunker for indexing
    #[must_use]
    pub fn with_chunker(mut self, config: ChunkerConfig) -> Self {
        self.chunk_threshold = config.chunk_size;
        self.chunker = AdaptiveChunker::with_config(config);
        self
    }

    /// The underlying keyword index
    #[must_use]
    pub fn bm25(&self) -> &BM25Index {
        &self.bm25
    }

    /// Index a document into the keyword and vector components
    ///
    /// Long documents are split by the adaptive chunker when auto-chunking is
    /// on; each chunk is indexed under `{id}_{chunk_id}` with `parent_doc_id`
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns an error when the vector backend rejects a write. The keyword
    /// index itself never fails.
    pub async fn index_document(
        &self,
        id: &str,
        content: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        if self.config.auto_chunk && content.chars().count() > self.chunk_threshold {
            let chunks = self.chunker.chunk_text(content, metadata);
            debug!(id, chunks = chunks.len(), "indexing chunked document");
            for chunk in chunks {
                let chunk_id = format!("{id}_{}", chunk.chunk_id);
                let mut chunk_metadata = chunk.metadata.clone();
                chunk_metadata.insert(
                    "parent_doc_id".to_string(),
                    MetadataValue::from(id.to_string()),
                );
                chunk_metadata.insert("is_chunk".to_string(), MetadataValue::Bool(true));
                self.bm25
                    .add_document(&chunk_id, &chunk.content, chunk_metadata.clone());
                if let Some(vector) = &self.vector {
                    vector
                        .add(VectorDocument {
                            id: chunk_id,
                            content: chunk.content,
                            metadata: chunk_metadata,
                            embedding: None,
                        })
                        .await?;
                }
            }
            return Ok(());
        }

        self.bm25.add_document(id, content, metadata.clone());
        if let Some(vector) = &self.vector {
            vector
                .add(VectorDocument {
                    id: id.to_string(),
                    content: content.to_string(),
                    metadata: metadata.clone(),
                    embedding: None,
                })
                .await?;
        }
        Ok(())
    }

    /// Remove a document from the keyword and vector components
    ///
    /// # Errors
    ///
    /// Returns an error when the vector backend rejects the delete.
    pub async fn remove_document(&self, id: &str) -> Result<bool> {
        let removed = self.bm25.remove(id);
        if let Some(vector) = &self.vector {
            vector.delete(id).await?;
        }
        Ok(removed)
    }

    /// Retrieve per the given strategy
    ///
    /// Returns the results plus a list of degraded-backend notices; a failing
    /// backend never fails the retrieval. `Recency` and `Relevance` (which
    /// have no backend-specific meaning here) fall through to hybrid fusion.
    pub async fn retrieve(
        &self,
        query: &str,
        max_results: usize,
        strategy: RetrievalStrategy,
        filters: Option<&MetadataFilter>,
    ) -> (Vec<RetrievedDocument>, Vec<String>) {
        match strategy {
            RetrievalStrategy::Keyword => (self.bm25.search(query, max_results, filters), Vec::new()),
            RetrievalStrategy::Semantic => self.vector_component(query, max_results, filters).await,
            RetrievalStrategy::Graph => self.graph_component(query, max_results).await,
            RetrievalStrategy::Hybrid
            | RetrievalStrategy::Recency
            | RetrievalStrategy::Relevance => {
                self.hybrid_retrieve(query, max_results, filters).await
            }
        }
    }

    async fn hybrid_retrieve(
        &self,
        query: &str,
        max_results: usize,
        filters: Option<&MetadataFilter>,
    ) -> (Vec<RetrievedDocument>, Vec<String>) {
        let component_budget = max_results * 2;

        let (keyword, (semantic, semantic_errors), (graph, graph_errors)) = tokio::join!(
            async { self.bm25.search(query, component_budget, filters) },
            self.vector_component(query, component_budget, filters),
            self.graph_component(query, component_budget),
        );

        let mut errors = semantic_errors;
        errors.extend(graph_errors);

        let mut fused = self.fuse(keyword, semantic, graph);
        fused.truncate(max_results);

        if self.config.rerank {
            if let Some(reranker) = &self.reranker {
                fused = reranker.rerank(query, fused);
            }
        }

        (fused, errors)
    }

    async fn vector_component(
        &self,
        query: &str,
        max_results: usize,
        filters: Option<&MetadataFilter>,
    ) -> (Vec<RetrievedDocument>, Vec<String>) {
        let Some(vector) = &self.vector else {
            return (Vec::new(), Vec::new());
        };

        let deadline = Duration::from_millis(self.config.backend_timeout_ms);
        let call = vector.search(query, max_results, self.config.score_threshold, filters);
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(matches)) => {
                let results = matches
                    .into_iter()
                    .map(|m| RetrievedDocument {
                        id: m.id,
                        content: m.content,
                        score: f64::from(m.score),
                        metadata: m.metadata,
                        method: RetrievalMethod::Semantic,
                        component_scores: BTreeMap::new(),
                    })
                    .collect();
                (results, Vec::new())
            }
            Ok(Err(err)) => {
                warn!(error = %err, "vector backend failed; degrading to empty");
                (Vec::new(), vec![format!("vector: {err}")])
            }
            Err(_) => {
                warn!(timeout_ms = self.config.backend_timeout_ms, "vector backend timed out");
                (
                    Vec::new(),
                    vec![format!(
                        "vector: timed out after {}ms",
                        self.config.backend_timeout_ms
                    )],
                )
            }
        }
    }

    async fn graph_component(
        &self,
        query: &str,
        max_results: usize,
    ) -> (Vec<RetrievedDocument>, Vec<String>) {
        let Some(graph) = &self.graph else {
            return (Vec::new(), Vec::new());
        };

        let deadline = Duration::from_millis(self.config.backend_timeout_ms);
        let call = graph.semantic_search(query, None, max_results);
        let entities = match tokio::time::timeout(deadline, call).await {
            Ok(Ok(entities)) => entities,
            Ok(Err(err)) => {
                warn!(error = %err, "graph backend failed; degrading to empty");
                return (Vec::new(), vec![format!("graph: {err}")]);
            }
            Err(_) => {
                warn!(timeout_ms = self.config.backend_timeout_ms, "graph backend timed out");
                return (
                    Vec::new(),
                    vec![format!(
                        "graph: timed out after {}ms",
                        self.config.backend_timeout_ms
                    )],
                );
            }
        };

        let mut results = Vec::with_capacity(entities.len());
        for scored in entities {
            let content = match graph
                .relationships(&scored.entity.id, Direction::Both, None)
                .await
            {
                Ok(edges) => build_context_text(&scored.entity, &edges),
                Err(err) => {
                    trace!(error = %err, "relationship expansion failed; using bare entity");
                    format!("{} ({})", scored.entity.name, scored.entity.entity_type)
                }
            };
            let mut metadata = Metadata::new();
            metadata.insert(
                "entity_type".to_string(),
                MetadataValue::from(scored.entity.entity_type.clone()),
            );
            metadata.insert(
                "entity_name".to_string(),
                MetadataValue::from(scored.entity.name.clone()),
            );
            results.push(RetrievedDocument {
                id: scored.entity.id,
                content,
                score: scored.score,
                metadata,
                method: RetrievalMethod::Graph,
                component_scores: BTreeMap::new(),
            });
        }
        (results, Vec::new())
    }

    /// Weighted fusion over min-max-normalized component scores
    fn fuse(
        &self,
        keyword: Vec<RetrievedDocument>,
        semantic: Vec<RetrievedDocument>,
        graph: Vec<RetrievedDocument>,
    ) -> Vec<RetrievedDocument> {
        let weights = self.config.weights.normalized();
        let components = [
            ("keyword", weights.keyword, normalize_scores(keyword)),
            ("semantic", weights.semantic, normalize_scores(semantic)),
            ("graph", weights.graph, normalize_scores(graph)),
        ];

        let mut score_map: BTreeMap<String, RetrievedDocument> = BTreeMap::new();
        for (name, weight, results) in components {
            for result in results {
                let entry = score_map
                    .entry(result.id.clone())
                    .or_insert_with(|| RetrievedDocument {
                        id: result.id.clone(),
                        content: result.content.clone(),
                        score: 0.0,
                        metadata: result.metadata.clone(),
                        method: RetrievalMethod::Hybrid,
                        component_scores: BTreeMap::new(),
                    });
                entry
                    .component_scores
                    .insert(name.to_string(), result.score);
                entry.score += result.score * weight;
            }
        }

        let mut fused: Vec<RetrievedDocument> = score_map.into_values().collect();
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        fused
    }
}

/// Min-max normalize component scores into [0, 1]
///
/// A degenerate range (max == min) collapses every score to 1.0.
fn normalize_scores(mut results: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
    if results.is_empty() {
        return results;
    }
    let min = results.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
    let max = results
        .iter()
        .map(|r| r.score)
        .fold(f64::NEG_INFINITY, f64::max);

    if (max - min).abs() < 1e-10 {
        for result in &mut results {
            result.score = 1.0;
        }
        return results;
    }
    for result in &mut results {
        result.score = (result.score - min) / (max - min);
    }
    results
}

/// Render an entity and its nearest relationships into retrievable text
fn build_context_text(
    entity: &strata_graph::Entity,
    edges: &[strata_graph::RelatedEdge],
) -> String {
    let mut parts = vec![format!("{} ({})", entity.name, entity.entity_type)];
    for edge in edges.iter().take(GRAPH_CONTEXT_EDGES) {
        let verb = edge.relationship.relationship_type.replace('_', " ");
        parts.push(format!(
            "{} {} {}",
            edge.source.name,
            verb.to_lowercase(),
            edge.target.name
        ));
    }
    parts.join(". ")
}
