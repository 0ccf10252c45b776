//! Shared types for the retrieval pipeline

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use strata_core::types::Metadata;

/// BM25 parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BM25Config {
    /// Term frequency saturation parameter (default: 1.5)
    pub k1: f64,
    /// Length normalization parameter (default: 0.75)
    pub b: f64,
    /// Floor value for IDF scores (default: 0.25)
    pub epsilon: f64,
}

impl Default for BM25Config {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// A text chunk produced by the adaptive chunker
///
/// Positions are character offsets into the source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk identifier, unique within one chunking run
    pub chunk_id: String,
    /// Chunk content
    pub content: String,
    /// Start offset (characters, inclusive)
    pub start_pos: usize,
    /// End offset (characters, exclusive)
    pub end_pos: usize,
    /// Overlap with the preceding chunk
    pub overlap_before: usize,
    /// Overlap with the following chunk
    pub overlap_after: usize,
    /// Caller metadata plus `chunk_index` and `total_length`
    pub metadata: Metadata,
}

impl Chunk {
    /// Chunk length in characters
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_pos - self.start_pos
    }

    /// Whether the chunk is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_pos == self.end_pos
    }
}

/// Adaptive chunker parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Minimum allowed chunk size
    pub min_chunk_size: usize,
    /// Maximum allowed chunk size
    pub max_chunk_size: usize,
    /// Base overlap between adjacent chunks
    pub base_overlap: usize,
    /// Scale overlap with sentence density
    pub adaptive_overlap: bool,
    /// Prefer sentence boundaries when splitting
    pub preserve_sentences: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            min_chunk_size: 100,
            max_chunk_size: 1024,
            base_overlap: 50,
            adaptive_overlap: true,
            preserve_sentences: true,
        }
    }
}

/// Which component produced a retrieval result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// BM25 keyword search
    Bm25,
    /// Vector similarity search
    Semantic,
    /// Graph traversal search
    Graph,
    /// Weighted fusion of components
    Hybrid,
}

impl RetrievalMethod {
    /// The wire string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bm25 => "bm25",
            Self::Semantic => "semantic",
            Self::Graph => "graph",
            Self::Hybrid => "hybrid",
        }
    }
}

/// A unified retrieval result from one component or from fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Document id
    pub id: String,
    /// Document content
    pub content: String,
    /// Score; component scores are raw, fused scores are weighted sums of
    /// min-max-normalized component scores
    pub score: f64,
    /// Document metadata
    pub metadata: Metadata,
    /// Producing component
    pub method: RetrievalMethod,
    /// Per-component normalized scores (fused results only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_scores: BTreeMap<String, f64>,
}

/// Fusion weights for the hybrid strategy, normalized at use
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Vector component weight
    pub semantic: f64,
    /// BM25 component weight
    pub keyword: f64,
    /// Graph component weight
    pub graph: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            keyword: 0.3,
            graph: 0.2,
        }
    }
}

impl FusionWeights {
    /// Weights scaled to sum to one (uniform when all are zero)
    #[must_use]
    pub fn normalized(self) -> Self {
        let total = self.semantic + self.keyword + self.graph;
        if total <= f64::EPSILON {
            return Self {
                semantic: 1.0 / 3.0,
                keyword: 1.0 / 3.0,
                graph: 1.0 / 3.0,
            };
        }
        Self {
            semantic: self.semantic / total,
            keyword: self.keyword / total,
            graph: self.graph / total,
        }
    }
}

/// Hybrid retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Component fusion weights
    pub weights: FusionWeights,
    /// Run the reranker over fused results when one is attached
    pub rerank: bool,
    /// Per-backend call deadline in milliseconds
    pub backend_timeout_ms: u64,
    /// Vector similarity floor passed to the vector backend
    pub score_threshold: f32,
    /// Auto-chunk documents longer than `chunk_size` characters on indexing
    pub auto_chunk: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            rerank: false,
            backend_timeout_ms: 2_000,
            score_threshold: 0.0,
            auto_chunk: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_normalize_to_unit_sum() {
        let weights = FusionWeights {
            semantic: 2.0,
            keyword: 1.0,
            graph: 1.0,
        }
        .normalized();
        assert!((weights.semantic - 0.5).abs() < 1e-9);
        assert!((weights.keyword - 0.25).abs() < 1e-9);
        assert!((weights.semantic + weights.keyword + weights.graph - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let weights = FusionWeights {
            semantic: 0.0,
            keyword: 0.0,
            graph: 0.0,
        }
        .normalized();
        assert!((weights.semantic - 1.0 / 3.0).abs() < 1e-9);
    }
}
