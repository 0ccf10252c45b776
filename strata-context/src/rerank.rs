//! Reranking seam
//!
//! Reranking is a pure function over fused results: `(query, results) →
//! results`. A cross-encoder implementation can be attached to the hybrid
//! retriever behind this trait; the default pass-through keeps the fusion
//! ordering.

use crate::types::RetrievedDocument;

/// Pure reordering pass over fused retrieval results
pub trait Reranker: Send + Sync {
    /// Reorder (and possibly rescore) the results for `query`
    fn rerank(&self, query: &str, results: Vec<RetrievedDocument>) -> Vec<RetrievedDocument>;
}

/// Pass-through reranker
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReranker;

impl Reranker for NoopReranker {
    fn rerank(&self, _query: &str, results: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetrievalMethod;
    use strata_core::types::Metadata;

    #[test]
    fn noop_preserves_order() {
        let results = vec![
            RetrievedDocument {
                id: "a".into(),
                content: "first".into(),
                score: 0.9,
                metadata: Metadata::new(),
                method: RetrievalMethod::Hybrid,
                component_scores: std::collections::BTreeMap::new(),
            },
            RetrievedDocument {
                id: "b".into(),
                content: "second".into(),
                score: 0.5,
                metadata: Metadata::new(),
                method: RetrievalMethod::Hybrid,
                component_scores: std::collections::BTreeMap::new(),
            },
        ];
        let reranked = NoopReranker.rerank("query", results.clone());
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].id, results[0].id);
    }
}
