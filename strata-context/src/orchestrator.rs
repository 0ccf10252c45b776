//! Tier orchestration
//!
//! The orchestrator owns the three memory tiers and coordinates both data
//! paths:
//!
//! - **Write**: classify by metadata → immediate always, session for
//!   important or task-like items, long-term for durable knowledge. Immediate
//!   and session writes are synchronous; long-term writes go through an
//!   unbounded channel to a writer task when async mode is on.
//! - **Read**: response-cache lookup → per-tier search in parallel →
//!   cross-tier scoring → content-hash deduplication → sort → token-budget
//!   packing → cache install.
//!
//! Store and retrieve never fail because an optional backend failed; partial
//! degradation is visible in response metadata and metrics only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use strata_core::score::{dedup_key, estimate_tokens, retrieval_score, word_set, Tier};
use strata_core::types::{
    ContentKind, ContextItem, ContextRequest, ContextResponse, Importance, Metadata, Persistence,
    RetrievalStrategy,
};
use strata_graph::InMemoryGraph;
use strata_memory::{
    BufferMetrics, ImmediateBuffer, InMemoryVectorStore, SessionConfig, SessionStats, SessionStore,
};

use crate::error::{ContextError, Result};
use crate::hybrid::HybridRetriever;
use crate::types::{HybridConfig, RetrievedDocument};

/// Response-cache capacity; overflowing drops the oldest entries
const CACHE_MAX_ENTRIES: usize = 100;
/// How many of the oldest entries an overflow drops
const CACHE_EVICT_BATCH: usize = 20;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Immediate buffer capacity
    pub immediate_size: usize,
    /// Immediate buffer TTL in seconds (0 disables TTL)
    pub immediate_ttl_seconds: u64,
    /// Session store configuration
    pub session: SessionConfig,
    /// Default token budget for [`Orchestrator::active_context`]
    pub context_budget_tokens: usize,
    /// Whether the long-term tier participates at all
    pub enable_long_term: bool,
    /// Strategy used when a request does not override it
    pub default_strategy: RetrievalStrategy,
    /// Response caching
    pub enable_cache: bool,
    /// Response cache TTL in seconds
    pub cache_ttl_seconds: u64,
    /// Dispatch long-term writes through the writer task
    pub async_long_term: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            immediate_size: 10,
            immediate_ttl_seconds: 3_600,
            session: SessionConfig::default(),
            context_budget_tokens: 4_096,
            enable_long_term: true,
            default_strategy: RetrievalStrategy::Hybrid,
            enable_cache: true,
            cache_ttl_seconds: 60,
            async_long_term: true,
        }
    }
}

/// Aggregate orchestrator statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Store calls since construction
    pub total_stores: u64,
    /// Retrieve calls since construction (cache hits included)
    pub total_retrievals: u64,
    /// Items written to the immediate tier
    pub immediate_stores: u64,
    /// Items written to the session tier
    pub session_stores: u64,
    /// Items dispatched to the long-term tier
    pub long_term_stores: u64,
    /// Response cache hits
    pub cache_hits: u64,
    /// Response cache misses
    pub cache_misses: u64,
    /// Failed asynchronous long-term writes
    pub long_term_write_failures: u64,
    /// Mean store latency in milliseconds
    pub avg_store_latency_ms: f64,
    /// Mean retrieve latency in milliseconds
    pub avg_retrieve_latency_ms: f64,
    /// Live response-cache entries
    pub cache_entries: usize,
    /// Immediate tier metrics
    pub immediate: BufferMetrics,
    /// Session tier statistics
    pub session: SessionStats,
    /// Documents in the keyword index
    pub indexed_documents: usize,
}

#[derive(Default)]
struct Metrics {
    total_stores: AtomicU64,
    total_retrievals: AtomicU64,
    immediate_stores: AtomicU64,
    session_stores: AtomicU64,
    long_term_stores: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    long_term_write_failures: AtomicU64,
    store_latency_us: AtomicU64,
    retrieve_latency_us: AtomicU64,
}

struct CachedEntry {
    response: ContextResponse,
    inserted_at: Instant,
}

/// Central coordinator for the tiered context store
///
/// Create inside a Tokio runtime: when asynchronous long-term writes are
/// enabled the constructor spawns the writer task.
pub struct Orchestrator {
    config: OrchestratorConfig,
    immediate: ImmediateBuffer,
    session: SessionStore,
    retriever: Arc<HybridRetriever>,
    cache: Mutex<HashMap<String, CachedEntry>>,
    metrics: Arc<Metrics>,
    writer_tx: Option<mpsc::UnboundedSender<ContextItem>>,
}

impl Orchestrator {
    /// Create an orchestrator around a configured retriever
    #[must_use]
    pub fn new(config: OrchestratorConfig, retriever: HybridRetriever) -> Self {
        let retriever = Arc::new(retriever);
        let metrics = Arc::new(Metrics::default());

        let writer_tx = (config.async_long_term && config.enable_long_term)
            .then(|| Self::spawn_writer(Arc::clone(&retriever), Arc::clone(&metrics)));

        info!(
            immediate_size = config.immediate_size,
            session_size = config.session.max_size,
            long_term = config.enable_long_term,
            "orchestrator initialized"
        );

        Self {
            immediate: ImmediateBuffer::new(config.immediate_size, config.immediate_ttl_seconds),
            session: SessionStore::new(config.session.clone()),
            retriever,
            cache: Mutex::new(HashMap::new()),
            metrics,
            writer_tx,
            config,
        }
    }

    /// Create an orchestrator with in-memory vector and graph backends
    #[must_use]
    pub fn in_memory(config: OrchestratorConfig) -> Self {
        let retriever = HybridRetriever::new(HybridConfig::default())
            .with_vector_backend(Arc::new(InMemoryVectorStore::with_default_embedder()))
            .with_graph_backend(Arc::new(InMemoryGraph::new()));
        Self::new(config, retriever)
    }

    /// Store a text fragment, routing it to the appropriate tiers
    ///
    /// Returns the new item's id. `layer_hint` bypasses classification and
    /// writes to exactly that tier. Long-term indexing failures are logged
    /// and counted, never surfaced.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `content` is empty or whitespace-only.
    pub async fn store(
        &self,
        content: &str,
        metadata: Metadata,
        layer_hint: Option<Tier>,
        conversation_id: Option<&str>,
    ) -> Result<String> {
        let mut item = ContextItem::new(content, metadata);
        if let Some(cid) = conversation_id {
            item = item.with_conversation_id(cid);
        }
        self.store_item(item, layer_hint).await
    }

    /// Store a fully-constructed item (expiry deadline, explicit timestamp,
    /// precomputed embedding), routing it like [`Orchestrator::store`]
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the item's content is empty or whitespace-only.
    pub async fn store_item(&self, item: ContextItem, layer_hint: Option<Tier>) -> Result<String> {
        if item.content.trim().is_empty() {
            return Err(ContextError::InvalidInput(
                "content must be non-empty".to_string(),
            ));
        }
        let started = Instant::now();

        let tiers = layer_hint.map_or_else(|| self.route(&item), |tier| vec![tier]);
        trace!(id = %item.id, ?tiers, "routing store");

        for tier in &tiers {
            match tier {
                Tier::Immediate => {
                    self.immediate.add(item.clone());
                    self.metrics.immediate_stores.fetch_add(1, Ordering::Relaxed);
                }
                Tier::Session => {
                    self.session.add(item.clone());
                    self.metrics.session_stores.fetch_add(1, Ordering::Relaxed);
                }
                Tier::LongTerm => {
                    if !self.config.enable_long_term {
                        continue;
                    }
                    self.metrics.long_term_stores.fetch_add(1, Ordering::Relaxed);
                    if let Some(tx) = &self.writer_tx {
                        if tx.send(item.clone()).is_err() {
                            self.metrics
                                .long_term_write_failures
                                .fetch_add(1, Ordering::Relaxed);
                            warn!(id = %item.id, "long-term writer task is gone; write dropped");
                        }
                    } else if let Err(err) = self
                        .retriever
                        .index_document(&item.id, &item.content, &item.metadata)
                        .await
                    {
                        self.metrics
                            .long_term_write_failures
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, id = %item.id, "long-term indexing failed");
                    }
                }
            }
        }

        if self.config.enable_cache {
            self.cache.lock().clear();
        }

        self.metrics.total_stores.fetch_add(1, Ordering::Relaxed);
        self.record_latency(&self.metrics.store_latency_us, started);
        Ok(item.id)
    }

    /// Retrieve context for a request
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `max_results` is zero. Backend failures degrade
    /// to fewer results and are listed in `backend_errors`.
    pub async fn retrieve(&self, request: &ContextRequest) -> Result<ContextResponse> {
        if request.max_results == 0 {
            return Err(ContextError::InvalidInput(
                "max_results must be at least 1".to_string(),
            ));
        }
        let started = Instant::now();

        let cache_key = self.config.enable_cache.then(|| request.cache_key());
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache_lookup(key) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.total_retrievals.fetch_add(1, Ordering::Relaxed);
                self.record_latency(&self.metrics.retrieve_latency_us, started);
                return Ok(hit);
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let now = Utc::now();
        let query_words = word_set(&request.query);

        let immediate_fut = async {
            if !request.include_immediate {
                return Vec::new();
            }
            let mut items = self
                .immediate
                .get_recent(request.max_results, request.conversation_id.as_deref());
            if !request.query.is_empty() {
                let needles: Vec<String> = request
                    .query
                    .to_lowercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                items.retain(|item| {
                    let content = item.content.to_lowercase();
                    needles.iter().any(|needle| content.contains(needle))
                });
            }
            items
        };

        let session_fut = async {
            if !request.include_session {
                return Vec::new();
            }
            self.session.search(
                &request.query,
                request.max_results,
                request.filters.as_ref(),
                request.conversation_id.as_deref(),
                request.task_id.as_deref(),
            )
        };

        let long_term_fut = async {
            if !(request.include_long_term && self.config.enable_long_term) {
                return (Vec::new(), Vec::new());
            }
            self.retriever
                .retrieve(
                    &request.query,
                    request.max_results,
                    request.strategy,
                    request.filters.as_ref(),
                )
                .await
        };

        let (immediate_items, session_items, (long_term_docs, backend_errors)) =
            tokio::join!(immediate_fut, session_fut, long_term_fut);

        let immediate_count = immediate_items.len();
        let session_count = session_items.len();
        let long_term_count = long_term_docs.len();

        // Score every candidate with its tier weight
        let mut candidates: Vec<(f64, ContextItem)> = Vec::new();
        for item in immediate_items {
            let score = retrieval_score(&item, &query_words, Tier::Immediate, now, None);
            candidates.push((score, item));
        }
        for item in session_items {
            let score = retrieval_score(&item, &query_words, Tier::Session, now, None);
            candidates.push((score, item));
        }
        for doc in long_term_docs {
            let item = Self::document_to_item(doc);
            let fused = item.relevance_score.clamp(0.0, 1.0);
            let score = retrieval_score(&item, &query_words, Tier::LongTerm, now, Some(fused));
            candidates.push((score, item));
        }

        candidates.retain(|(_, item)| {
            !item.is_expired(now)
                && request.since.is_none_or(|since| item.timestamp >= since)
                && request.until.is_none_or(|until| item.timestamp <= until)
        });

        // Deduplicate by content hash, keeping the highest-scoring copy
        let mut best: HashMap<String, (f64, ContextItem)> = HashMap::new();
        for (score, item) in candidates {
            let key = dedup_key(&item.content);
            match best.get(&key) {
                Some((existing, _)) if *existing >= score => {}
                _ => {
                    best.insert(key, (score, item));
                }
            }
        }

        let mut ranked: Vec<(f64, ContextItem)> = best.into_values().collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        // Token-budget packing (or plain top-k without a budget)
        let mut items = Vec::new();
        let mut total_tokens = 0usize;
        for (score, mut item) in ranked {
            if items.len() >= request.max_results {
                break;
            }
            let tokens = estimate_tokens(&item.content);
            if let Some(budget) = request.max_tokens {
                if total_tokens + tokens > budget {
                    continue;
                }
            }
            item.relevance_score = score;
            total_tokens += tokens;
            items.push(item);
        }

        let response = ContextResponse {
            items,
            strategy: request.strategy,
            immediate_count,
            session_count,
            long_term_count,
            cache_hit: false,
            total_tokens,
            backend_errors,
        };

        if let Some(key) = cache_key {
            self.cache_install(key, response.clone());
        }
        self.metrics.total_retrievals.fetch_add(1, Ordering::Relaxed);
        self.record_latency(&self.metrics.retrieve_latency_us, started);
        Ok(response)
    }

    /// Retrieve with the configured default strategy
    ///
    /// Convenience wrapper over [`Orchestrator::retrieve`] for the common
    /// "query across all tiers" case.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `max_results` is zero.
    pub async fn query(&self, query: &str, max_results: usize) -> Result<ContextResponse> {
        let request = ContextRequest::new(query)
            .with_max_results(max_results)
            .with_strategy(self.config.default_strategy);
        self.retrieve(&request).await
    }

    /// Currently active context within a token budget
    ///
    /// Combines the immediate buffer with the session working set, ordered by
    /// importance then recency, packed into `max_tokens` (defaulting to the
    /// configured context budget). Returns the items and their token total.
    #[must_use]
    pub fn active_context(&self, max_tokens: Option<usize>) -> (Vec<ContextItem>, usize) {
        let budget = max_tokens.unwrap_or(self.config.context_budget_tokens);

        let mut items = self
            .immediate
            .get_recent(self.config.immediate_size, None);
        items.extend(
            self.session
                .search("", self.config.session.max_size, None, None, None),
        );

        items.sort_by(|a, b| {
            b.importance_score
                .partial_cmp(&a.importance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        let mut selected = Vec::new();
        let mut total = 0usize;
        for item in items {
            let tokens = estimate_tokens(&item.content);
            if total + tokens > budget {
                break;
            }
            total += tokens;
            selected.push(item);
        }
        (selected, total)
    }

    /// Clear the immediate buffer (or one conversation within it)
    pub fn clear_immediate(&self, conversation_id: Option<&str>) {
        self.immediate.clear(conversation_id);
        if self.config.enable_cache {
            self.cache.lock().clear();
        }
    }

    /// Clear the session store (or one conversation within it)
    pub fn clear_session(&self, conversation_id: Option<&str>) {
        match conversation_id {
            Some(cid) => self.session.clear_conversation(cid),
            None => self.session.clear(),
        }
        if self.config.enable_cache {
            self.cache.lock().clear();
        }
    }

    /// Statistics snapshot across tiers, cache, and latencies
    #[must_use]
    pub fn statistics(&self) -> OrchestratorStats {
        let stores = self.metrics.total_stores.load(Ordering::Relaxed);
        let retrievals = self.metrics.total_retrievals.load(Ordering::Relaxed);
        let avg = |total_us: u64, count: u64| {
            if count == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                {
                    total_us as f64 / count as f64 / 1000.0
                }
            }
        };

        OrchestratorStats {
            total_stores: stores,
            total_retrievals: retrievals,
            immediate_stores: self.metrics.immediate_stores.load(Ordering::Relaxed),
            session_stores: self.metrics.session_stores.load(Ordering::Relaxed),
            long_term_stores: self.metrics.long_term_stores.load(Ordering::Relaxed),
            cache_hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.metrics.cache_misses.load(Ordering::Relaxed),
            long_term_write_failures: self
                .metrics
                .long_term_write_failures
                .load(Ordering::Relaxed),
            avg_store_latency_ms: avg(
                self.metrics.store_latency_us.load(Ordering::Relaxed),
                stores,
            ),
            avg_retrieve_latency_ms: avg(
                self.metrics.retrieve_latency_us.load(Ordering::Relaxed),
                retrievals,
            ),
            cache_entries: self.cache.lock().len(),
            immediate: self.immediate.metrics(),
            session: self.session.stats(),
            indexed_documents: self.retriever.bm25().len(),
        }
    }

    /// Tier classification from typed metadata
    fn route(&self, item: &ContextItem) -> Vec<Tier> {
        let mut tiers = vec![Tier::Immediate];

        if matches!(item.importance(), Importance::High | Importance::Critical)
            || matches!(
                item.kind(),
                Some(ContentKind::Task | ContentKind::Decision | ContentKind::Preference)
            )
        {
            tiers.push(Tier::Session);
        }

        if self.config.enable_long_term
            && (item.persistence() == Persistence::Permanent
                || matches!(
                    item.kind(),
                    Some(ContentKind::Fact | ContentKind::Knowledge | ContentKind::Preference)
                ))
        {
            tiers.push(Tier::LongTerm);
        }

        tiers
    }

    fn document_to_item(doc: RetrievedDocument) -> ContextItem {
        let mut item = ContextItem::new(doc.content, doc.metadata).with_id(doc.id);
        item.relevance_score = doc.score;
        item
    }

    fn cache_lookup(&self, key: &str) -> Option<ContextResponse> {
        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= ttl => {
                trace!(key = %&key[..8.min(key.len())], "response cache hit");
                let mut response = entry.response.clone();
                response.cache_hit = true;
                Some(response)
            }
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_install(&self, key: String, response: ContextResponse) {
        let mut cache = self.cache.lock();
        if cache.len() >= CACHE_MAX_ENTRIES {
            let mut by_age: Vec<(String, Instant)> = cache
                .iter()
                .map(|(k, entry)| (k.clone(), entry.inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
            for (stale_key, _) in by_age.into_iter().take(CACHE_EVICT_BATCH) {
                cache.remove(&stale_key);
            }
            debug!("response cache overflow; dropped oldest entries");
        }
        cache.insert(
            key,
            CachedEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    fn record_latency(&self, counter: &AtomicU64, started: Instant) {
        #[allow(clippy::cast_possible_truncation)]
        let micros = started.elapsed().as_micros() as u64;
        counter.fetch_add(micros, Ordering::Relaxed);
    }

    fn spawn_writer(
        retriever: Arc<HybridRetriever>,
        metrics: Arc<Metrics>,
    ) -> mpsc::UnboundedSender<ContextItem> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ContextItem>();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if let Err(err) = retriever
                    .index_document(&item.id, &item.content, &item.metadata)
                    .await
                {
                    metrics.long_term_write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, id = %item.id, "async long-term write failed");
                }
            }
            debug!("long-term writer task stopped");
        });
        tx
    }
}
