//! Vector backend contract and in-memory implementation
//!
//! The long-term tier's nearest-neighbor store. Real deployments wrap Qdrant,
//! pgvector, or similar behind [`VectorBackend`]; [`InMemoryVectorStore`]
//! implements the full contract over a concurrent map with cosine similarity
//! and is the default for tests and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use strata_core::types::Metadata;
use strata_core::MetadataFilter;

use crate::embeddings::{cosine_similarity, Embedder, HashEmbedder};
use crate::error::{MemoryError, Result};

/// A document handed to the vector store for indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Stable document id
    pub id: String,
    /// Document content
    pub content: String,
    /// Document metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional precomputed embedding
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A similarity match returned from search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Matched document id
    pub id: String,
    /// Matched document content
    pub content: String,
    /// Similarity score in [0, 1], higher is closer
    pub score: f32,
    /// Matched document metadata
    pub metadata: Metadata,
}

/// Pluggable embedding-based nearest-neighbor store
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Index one document, replacing any previous document with the same id
    async fn add(&self, document: VectorDocument) -> Result<String>;

    /// Index a batch of documents
    async fn add_batch(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>>;

    /// Search by query text
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        score_threshold: f32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Search by a precomputed embedding
    async fn search_by_embedding(
        &self,
        embedding: &[f32],
        max_results: usize,
        score_threshold: f32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Remove a document; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;
}

struct StoredDocument {
    content: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// In-memory vector store over a concurrent map
///
/// The store owns its synchronization (a sharded map), as backends are
/// required to; no external lock is involved.
pub struct InMemoryVectorStore {
    documents: DashMap<String, StoredDocument>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorStore {
    /// Create a store around the given embedder
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            documents: DashMap::new(),
            embedder,
        }
    }

    /// Create a store with the default hashing embedder
    #[must_use]
    pub fn with_default_embedder() -> Self {
        Self::new(Arc::new(HashEmbedder::default()))
    }

    /// Number of indexed documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("documents", &self.documents.len())
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorStore {
    async fn add(&self, document: VectorDocument) -> Result<String> {
        if document.id.is_empty() {
            return Err(MemoryError::InvalidInput(
                "document id must be non-empty".to_string(),
            ));
        }
        let embedding = match document.embedding {
            Some(embedding) => embedding,
            None => self.embedder.embed(&document.content).await?,
        };
        trace!(id = %document.id, "indexed vector document");
        self.documents.insert(
            document.id.clone(),
            StoredDocument {
                content: document.content,
                metadata: document.metadata,
                embedding,
            },
        );
        Ok(document.id)
    }

    async fn add_batch(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            ids.push(self.add(document).await?);
        }
        debug!(count = ids.len(), "indexed vector batch");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        score_threshold: f32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        self.search_by_embedding(&embedding, max_results, score_threshold, filters)
            .await
    }

    async fn search_by_embedding(
        &self,
        embedding: &[f32],
        max_results: usize,
        score_threshold: f32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let mut matches: Vec<VectorMatch> = self
            .documents
            .iter()
            .filter_map(|entry| {
                if filters.is_some_and(|f| !f.matches(&entry.metadata)) {
                    return None;
                }
                let score = cosine_similarity(embedding, &entry.embedding);
                if score < score_threshold {
                    return None;
                }
                Some(VectorMatch {
                    id: entry.key().clone(),
                    content: entry.content.clone(),
                    score,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(max_results);
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.documents.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::MetadataValue;

    fn doc(id: &str, content: &str) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            content: content.to_string(),
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn add_and_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::with_default_embedder();
        store.add(doc("1", "rust borrow checker rules")).await.unwrap();
        store.add(doc("2", "python interpreter internals")).await.unwrap();

        let results = store
            .search("rust borrow checker", 10, 0.0, None)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "1");
        assert!(results[0].score > 0.5);
    }

    #[tokio::test]
    async fn add_replaces_same_id() {
        let store = InMemoryVectorStore::with_default_embedder();
        store.add(doc("1", "first version")).await.unwrap();
        store.add(doc("1", "second version")).await.unwrap();
        assert_eq!(store.len(), 1);

        let results = store.search("second version", 10, 0.0, None).await.unwrap();
        assert_eq!(results[0].content, "second version");
    }

    #[tokio::test]
    async fn threshold_prunes_weak_matches() {
        let store = InMemoryVectorStore::with_default_embedder();
        store.add(doc("1", "completely unrelated cooking notes")).await.unwrap();

        let results = store
            .search("rust compiler diagnostics", 10, 0.9, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn filters_apply() {
        let store = InMemoryVectorStore::with_default_embedder();
        let mut tagged = doc("1", "shared content words");
        tagged
            .metadata
            .insert("type".to_string(), MetadataValue::from("fact"));
        store.add(tagged).await.unwrap();
        store.add(doc("2", "shared content words")).await.unwrap();

        let filter = MetadataFilter::new().eq("type", "fact");
        let results = store
            .search("shared content", 10, 0.0, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let store = InMemoryVectorStore::with_default_embedder();
        store.add(doc("1", "anything")).await.unwrap();
        assert!(store.search("", 10, 0.0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = InMemoryVectorStore::with_default_embedder();
        store.add(doc("1", "to be removed")).await.unwrap();
        assert!(store.delete("1").await.unwrap());
        assert!(!store.delete("1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn precomputed_embedding_is_respected() {
        let store = InMemoryVectorStore::new(Arc::new(HashEmbedder::new(4)));
        let mut document = doc("1", "ignored for embedding");
        document.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        store.add(document).await.unwrap();

        let results = store
            .search_by_embedding(&[1.0, 0.0, 0.0, 0.0], 10, 0.99, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
