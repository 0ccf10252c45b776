//! BM25 keyword index
//!
//! Classical Okapi BM25 over an inverted index:
//!
//! ```text
//! score(d, Q) = Σ idf(t) · tf(t,d) · (k1 + 1) / (tf(t,d) + k1 · (1 - b + b · |d| / avgdl))
//! idf(t)      = max(ε, ln((N - df + 0.5) / (df + 0.5) + 1))
//! ```
//!
//! Tokenization is shared by indexing and querying: lowercase, split on any
//! non-alphanumeric boundary, drop tokens shorter than two characters. IDF
//! values are cached and the cache is invalidated on any mutation.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, trace};

use strata_core::types::Metadata;
use strata_core::MetadataFilter;

use crate::types::{BM25Config, RetrievalMethod, RetrievedDocument};

/// Tokenize text for indexing and querying
///
/// Lowercase, split on any non-alphanumeric boundary, drop tokens of length
/// < 2. Language-agnostic by design.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

struct IndexedDocument {
    content: String,
    token_counts: HashMap<String, usize>,
    token_total: usize,
    metadata: Metadata,
}

#[derive(Default)]
struct IndexInner {
    documents: HashMap<String, IndexedDocument>,
    postings: HashMap<String, HashSet<String>>,
    doc_freqs: HashMap<String, usize>,
    idf_cache: HashMap<String, f64>,
    avg_doc_length: f64,
}

impl IndexInner {
    fn remove_document(&mut self, id: &str) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };
        for token in doc.token_counts.keys() {
            if let Some(ids) = self.postings.get_mut(token) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(token);
                    self.doc_freqs.remove(token);
                } else if let Some(df) = self.doc_freqs.get_mut(token) {
                    *df -= 1;
                }
            }
        }
        true
    }

    fn refresh_statistics(&mut self) {
        let total = self.documents.len();
        self.avg_doc_length = if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.documents
                    .values()
                    .map(|d| d.token_total)
                    .sum::<usize>() as f64
                    / total as f64
            }
        };
        self.idf_cache.clear();
    }

    fn idf(&mut self, token: &str, epsilon: f64) -> f64 {
        if let Some(cached) = self.idf_cache.get(token) {
            return *cached;
        }
        let df = self.doc_freqs.get(token).copied().unwrap_or(0);
        if df == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let (n, df) = (self.documents.len() as f64, df as f64);
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(epsilon);
        self.idf_cache.insert(token.to_string(), idf);
        idf
    }
}

/// Thread-safe Okapi BM25 inverted index
pub struct BM25Index {
    config: BM25Config,
    inner: Mutex<IndexInner>,
}

impl BM25Index {
    /// Create an index with default parameters (k1 = 1.5, b = 0.75, ε = 0.25)
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BM25Config::default())
    }

    /// Create an index with custom parameters
    #[must_use]
    pub fn with_config(config: BM25Config) -> Self {
        debug!(k1 = config.k1, b = config.b, epsilon = config.epsilon, "bm25 index created");
        Self {
            config,
            inner: Mutex::new(IndexInner::default()),
        }
    }

    /// Insert or replace a document
    ///
    /// Empty content is allowed: the document contributes no tokens and is
    /// never retrieved.
    pub fn add_document(&self, id: &str, content: &str, metadata: Metadata) {
        let tokens = tokenize(content);
        let mut token_counts: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *token_counts.entry(token.clone()).or_insert(0) += 1;
        }

        let mut inner = self.inner.lock();
        inner.remove_document(id);
        for token in token_counts.keys() {
            inner
                .postings
                .entry(token.clone())
                .or_default()
                .insert(id.to_string());
            *inner.doc_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        inner.documents.insert(
            id.to_string(),
            IndexedDocument {
                content: content.to_string(),
                token_total: tokens.len(),
                token_counts,
                metadata,
            },
        );
        inner.refresh_statistics();
        trace!(id, tokens = tokens.len(), "indexed document");
    }

    /// Remove a document; returns whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.remove_document(id);
        if removed {
            inner.refresh_statistics();
        }
        removed
    }

    /// Search the index, highest score first
    ///
    /// An empty query (or one with no surviving tokens) returns nothing.
    #[must_use]
    pub fn search(
        &self,
        query: &str,
        max_results: usize,
        filters: Option<&MetadataFilter>,
    ) -> Vec<RetrievedDocument> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let unique_tokens: HashSet<&String> = query_tokens.iter().collect();

        let mut inner = self.inner.lock();

        let mut candidates: HashSet<String> = HashSet::new();
        for token in &unique_tokens {
            if let Some(ids) = inner.postings.get(*token) {
                candidates.extend(ids.iter().cloned());
            }
        }

        let k1 = self.config.k1;
        let b = self.config.b;
        let avgdl = inner.avg_doc_length;

        let mut scored: Vec<(String, f64)> = Vec::with_capacity(candidates.len());
        for id in candidates {
            let idfs: Vec<(f64, usize)> = unique_tokens
                .iter()
                .filter_map(|token| {
                    let tf = inner
                        .documents
                        .get(&id)
                        .and_then(|d| d.token_counts.get(*token))
                        .copied()?;
                    Some((inner.idf(token, self.config.epsilon), tf))
                })
                .collect();
            let Some(doc) = inner.documents.get(&id) else {
                continue;
            };
            if filters.is_some_and(|f| !f.matches(&doc.metadata)) {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let doc_len = doc.token_total as f64;
            let score: f64 = idfs
                .into_iter()
                .map(|(idf, tf)| {
                    #[allow(clippy::cast_precision_loss)]
                    let tf = tf as f64;
                    idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * doc_len / avgdl))
                })
                .sum();
            scored.push((id, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(max_results);

        scored
            .into_iter()
            .filter_map(|(id, score)| {
                let doc = inner.documents.get(&id)?;
                Some(RetrievedDocument {
                    id,
                    content: doc.content.clone(),
                    score,
                    metadata: doc.metadata.clone(),
                    method: RetrievalMethod::Bm25,
                    component_scores: std::collections::BTreeMap::new(),
                })
            })
            .collect()
    }

    /// Number of indexed documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().documents.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().documents.is_empty()
    }

    /// Index statistics: (total documents, average doc length, vocabulary size)
    #[must_use]
    pub fn statistics(&self) -> (usize, f64, usize) {
        let inner = self.inner.lock();
        (
            inner.documents.len(),
            inner.avg_doc_length,
            inner.postings.len(),
        )
    }

    /// IDF of a token as the index currently stands (testing and diagnostics)
    #[must_use]
    pub fn idf(&self, token: &str) -> f64 {
        self.inner.lock().idf(token, self.config.epsilon)
    }
}

impl Default for BM25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> BM25Index {
        let index = BM25Index::new();
        index.add_document("d1", "machine learning algorithms", Metadata::new());
        index.add_document("d2", "machine learning and deep learning", Metadata::new());
        index.add_document("d3", "learning to code", Metadata::new());
        index
    }

    #[test]
    fn tokenize_drops_short_and_splits_on_punctuation() {
        assert_eq!(
            tokenize("What is Rust? It's great-stuff!"),
            vec!["what", "is", "rust", "it", "great", "stuff"]
        );
        assert_eq!(tokenize("a b c"), Vec::<String>::new());
        assert_eq!(tokenize("C3PO unit-42"), vec!["c3po", "unit", "42"]);
    }

    #[test]
    fn ranking_prefers_both_terms() {
        let index = indexed();
        let results = index.search("machine learning", 10, None);

        assert_eq!(results.len(), 3);
        let top_two: Vec<&str> = results[..2].iter().map(|r| r.id.as_str()).collect();
        assert!(top_two.contains(&"d1"));
        assert!(top_two.contains(&"d2"));
        assert_eq!(results[2].id, "d3");
        assert_eq!(results[0].method, RetrievalMethod::Bm25);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let index = indexed();
        assert!(index.search("", 10, None).is_empty());
        assert!(index.search("a ; !", 10, None).is_empty());
    }

    #[test]
    fn empty_content_is_indexed_but_never_retrieved() {
        let index = BM25Index::new();
        index.add_document("void", "", Metadata::new());
        assert_eq!(index.len(), 1);
        assert!(index.search("anything", 10, None).is_empty());
    }

    #[test]
    fn replace_or_insert_keeps_one_entry() {
        let index = BM25Index::new();
        index.add_document("d1", "original rust content", Metadata::new());
        index.add_document("d1", "replacement python content", Metadata::new());
        assert_eq!(index.len(), 1);

        assert!(index.search("rust", 10, None).is_empty());
        let results = index.search("python", 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "replacement python content");
    }

    #[test]
    fn remove_cleans_postings() {
        let index = indexed();
        assert!(index.remove("d2"));
        assert!(!index.remove("d2"));
        assert_eq!(index.len(), 2);

        let results = index.search("deep", 10, None);
        assert!(results.is_empty());
    }

    #[test]
    fn idf_floor_holds_for_common_terms() {
        let index = BM25Index::new();
        // "learning" appears in every document, making raw IDF tiny
        for i in 0..20 {
            index.add_document(&format!("d{i}"), "learning learning learning", Metadata::new());
        }
        assert!(index.idf("learning") >= 0.25);
    }

    #[test]
    fn filters_prune_results() {
        let index = BM25Index::new();
        let mut fact = Metadata::new();
        fact.insert(
            "type".to_string(),
            strata_core::types::MetadataValue::from("fact"),
        );
        index.add_document("d1", "rust compiles fast", fact);
        index.add_document("d2", "rust compiles slowly on my laptop", Metadata::new());

        let filter = MetadataFilter::new().eq("type", "fact");
        let results = index.search("rust compiles", 10, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "d1");
    }

    #[test]
    fn statistics_track_corpus() {
        let index = indexed();
        let (docs, avg_len, vocab) = index.statistics();
        assert_eq!(docs, 3);
        assert!(avg_len > 0.0);
        assert!(vocab >= 6);
    }
}
