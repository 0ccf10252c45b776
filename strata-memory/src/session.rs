//! Session store: the bounded working set
//!
//! Associative store with three overlapping indices: primary by id,
//! secondary by conversation, tertiary by task. Admission at capacity evicts
//! the lowest-scoring resident:
//!
//! ```text
//! age_hours   = (now - max(last_accessed, timestamp)) / 1h
//! recency     = 1 / (1 + age_hours)
//! evict_score = recency · importance_score · (1 + access_count)
//! ```
//!
//! Ties break toward the oldest timestamp. Optional consolidation replaces
//! large per-conversation groups with a single synthetic summary item.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use strata_core::score::{age_hours, jaccard, word_set};
use strata_core::types::{ContextItem, Metadata, MetadataValue};
use strata_core::MetadataFilter;

use crate::consolidation::{Summarizer, TimelineSummarizer};

/// Minimum group size for consolidation
const CONSOLIDATION_GROUP_MIN: usize = 5;

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum resident items
    pub max_size: usize,
    /// Minimum query relevance for search hits
    pub relevance_threshold: f64,
    /// Item count that triggers consolidation (None disables it)
    pub consolidation_threshold: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            relevance_threshold: 0.3,
            consolidation_threshold: None,
        }
    }
}

/// Session store statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Resident item count
    pub item_count: usize,
    /// Configured capacity
    pub max_size: usize,
    /// Fill ratio in percent
    pub usage_percent: f64,
    /// Mean importance score of residents
    pub average_importance: f64,
    /// Number of indexed conversations
    pub conversation_count: usize,
    /// Number of indexed tasks
    pub task_count: usize,
    /// Evictions since construction
    pub total_evictions: u64,
    /// Consolidation passes that produced a summary
    pub total_consolidations: u64,
}

#[derive(Default)]
struct SessionInner {
    items: HashMap<String, ContextItem>,
    by_conversation: HashMap<String, HashSet<String>>,
    by_task: HashMap<String, HashSet<String>>,
}

impl SessionInner {
    fn index(&mut self, item: &ContextItem) {
        if let Some(cid) = &item.conversation_id {
            self.by_conversation
                .entry(cid.clone())
                .or_default()
                .insert(item.id.clone());
        }
        if let Some(tid) = &item.task_id {
            self.by_task
                .entry(tid.clone())
                .or_default()
                .insert(item.id.clone());
        }
    }

    fn unindex(&mut self, item: &ContextItem) {
        if let Some(cid) = &item.conversation_id {
            if let Some(set) = self.by_conversation.get_mut(cid) {
                set.remove(&item.id);
                if set.is_empty() {
                    self.by_conversation.remove(cid);
                }
            }
        }
        if let Some(tid) = &item.task_id {
            if let Some(set) = self.by_task.get_mut(tid) {
                set.remove(&item.id);
                if set.is_empty() {
                    self.by_task.remove(tid);
                }
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<ContextItem> {
        let item = self.items.remove(id)?;
        self.unindex(&item);
        Some(item)
    }
}

/// Bounded working-set store with importance-weighted eviction
pub struct SessionStore {
    config: SessionConfig,
    summarizer: Arc<dyn Summarizer>,
    inner: Mutex<SessionInner>,
    total_evictions: AtomicU64,
    total_consolidations: AtomicU64,
}

impl SessionStore {
    /// Create a store with the given configuration and the default summarizer
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_summarizer(config, Arc::new(TimelineSummarizer))
    }

    /// Create a store with a custom consolidation summarizer
    #[must_use]
    pub fn with_summarizer(config: SessionConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        debug!(
            max_size = config.max_size,
            relevance_threshold = config.relevance_threshold,
            "session store created"
        );
        Self {
            config,
            summarizer,
            inner: Mutex::new(SessionInner::default()),
            total_evictions: AtomicU64::new(0),
            total_consolidations: AtomicU64::new(0),
        }
    }

    /// Insert or update an item
    ///
    /// An existing id is updated in place (and its index entries refreshed).
    /// A new item at capacity first evicts the lowest-scoring resident. When
    /// a consolidation threshold is configured and reached, a consolidation
    /// pass runs after the insert.
    pub fn add(&self, item: ContextItem) {
        let mut inner = self.inner.lock();

        if inner.items.contains_key(&item.id) {
            if let Some(previous) = inner.remove(&item.id) {
                trace!(id = %previous.id, "updating resident item in place");
            }
        } else if inner.items.len() >= self.config.max_size {
            self.evict_lowest(&mut inner);
        }

        inner.index(&item);
        inner.items.insert(item.id.clone(), item);

        if let Some(threshold) = self.config.consolidation_threshold {
            if inner.items.len() >= threshold {
                self.consolidate_locked(&mut inner);
            }
        }
    }

    /// Search residents per the shared relevance formula
    ///
    /// Candidates are narrowed by conversation/task indices, then by the
    /// metadata filter; expired items never match. A non-empty query scores
    /// each candidate as `0.6 · coverage + 0.4 · jaccard` and keeps those at
    /// or above the relevance threshold, ordered by `relevance · importance`.
    /// An empty query orders by `timestamp · importance`.
    pub fn search(
        &self,
        query: &str,
        max_results: usize,
        filters: Option<&MetadataFilter>,
        conversation_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Vec<ContextItem> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let candidate_ids: Vec<String> = {
            let narrowed: Option<HashSet<&String>> = match (conversation_id, task_id) {
                (None, None) => None,
                (cid, tid) => {
                    let mut sets: Vec<&HashSet<String>> = Vec::new();
                    if let Some(cid) = cid {
                        match inner.by_conversation.get(cid) {
                            Some(set) => sets.push(set),
                            None => return Vec::new(),
                        }
                    }
                    if let Some(tid) = tid {
                        match inner.by_task.get(tid) {
                            Some(set) => sets.push(set),
                            None => return Vec::new(),
                        }
                    }
                    let mut iter = sets.into_iter();
                    let first: HashSet<&String> =
                        iter.next().map(|s| s.iter().collect()).unwrap_or_default();
                    Some(iter.fold(first, |acc, set| {
                        acc.into_iter().filter(|id| set.contains(*id)).collect()
                    }))
                }
            };
            match narrowed {
                Some(ids) => ids.into_iter().cloned().collect(),
                None => inner.items.keys().cloned().collect(),
            }
        };

        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let query_set: HashSet<String> = query_words.iter().cloned().collect();

        let mut scored: Vec<(f64, f64, String)> = Vec::new();
        for id in candidate_ids {
            let Some(item) = inner.items.get(&id) else {
                continue;
            };
            if item.is_expired(now) {
                continue;
            }
            if filters.is_some_and(|f| !f.matches(&item.metadata)) {
                continue;
            }

            if query_words.is_empty() {
                #[allow(clippy::cast_precision_loss)]
                let order = item.timestamp.timestamp() as f64 * item.importance_score;
                scored.push((order, 0.0, id));
            } else {
                let content_lower = item.content.to_lowercase();
                let matches = query_words
                    .iter()
                    .filter(|w| content_lower.contains(w.as_str()))
                    .count();
                #[allow(clippy::cast_precision_loss)]
                let coverage = matches as f64 / query_words.len() as f64;
                let overlap = jaccard(&query_set, &word_set(&item.content));
                let relevance = 0.6 * coverage + 0.4 * overlap;
                if relevance < self.config.relevance_threshold {
                    continue;
                }
                scored.push((relevance * item.importance_score, relevance, id));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);

        scored
            .into_iter()
            .filter_map(|(_, relevance, id)| {
                let item = inner.items.get_mut(&id)?;
                item.mark_accessed();
                let mut copy = item.clone();
                copy.relevance_score = relevance;
                Some(copy)
            })
            .collect()
    }

    /// Run a consolidation pass now, regardless of threshold
    pub fn consolidate(&self) {
        let mut inner = self.inner.lock();
        self.consolidate_locked(&mut inner);
    }

    /// Remove every resident
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.by_conversation.clear();
        inner.by_task.clear();
        debug!("session store cleared");
    }

    /// Remove one conversation's residents
    pub fn clear_conversation(&self, conversation_id: &str) {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .by_conversation
            .get(conversation_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for id in ids {
            inner.remove(&id);
        }
    }

    /// Remove one task's residents
    pub fn clear_task(&self, task_id: &str) {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .by_task
            .get(task_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for id in ids {
            inner.remove(&id);
        }
    }

    /// Drop conversations with no activity for `idle` or longer
    ///
    /// A conversation's activity is the newest access (or creation) time of
    /// any of its residents. Returns how many conversations were removed.
    pub fn cleanup_idle_conversations(&self, idle: chrono::Duration) -> usize {
        let cutoff = Utc::now() - idle;
        let mut inner = self.inner.lock();

        let stale: Vec<String> = inner
            .by_conversation
            .iter()
            .filter(|(_, ids)| {
                ids.iter()
                    .filter_map(|id| inner.items.get(id))
                    .map(|item| item.last_accessed.unwrap_or(item.timestamp))
                    .max()
                    .is_some_and(|newest| newest < cutoff)
            })
            .map(|(cid, _)| cid.clone())
            .collect();

        for cid in &stale {
            let ids: Vec<String> = inner
                .by_conversation
                .get(cid)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for id in ids {
                inner.remove(&id);
            }
            debug!(conversation_id = %cid, "removed idle conversation");
        }
        stale.len()
    }

    /// Resident count
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the store holds no residents
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let inner = self.inner.lock();
        let count = inner.items.len();
        let average_importance = if count == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                inner.items.values().map(|i| i.importance_score).sum::<f64>() / count as f64
            }
        };
        #[allow(clippy::cast_precision_loss)]
        let usage_percent = if self.config.max_size == 0 {
            0.0
        } else {
            count as f64 / self.config.max_size as f64 * 100.0
        };
        SessionStats {
            item_count: count,
            max_size: self.config.max_size,
            usage_percent,
            average_importance,
            conversation_count: inner.by_conversation.len(),
            task_count: inner.by_task.len(),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            total_consolidations: self.total_consolidations.load(Ordering::Relaxed),
        }
    }

    fn evict_lowest(&self, inner: &mut SessionInner) {
        let now = Utc::now();
        let victim = inner
            .items
            .values()
            .map(|item| {
                let reference = item.last_accessed.map_or(item.timestamp, |accessed| {
                    accessed.max(item.timestamp)
                });
                let recency = 1.0 / (1.0 + age_hours(reference, now));
                #[allow(clippy::cast_precision_loss)]
                let score = recency * item.importance_score * (1.0 + item.access_count as f64);
                (score, item.timestamp, item.id.clone())
            })
            .min_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });

        if let Some((score, _, id)) = victim {
            trace!(id = %id, score, "evicting lowest-scoring resident");
            inner.remove(&id);
            self.total_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn consolidate_locked(&self, inner: &mut SessionInner) {
        let groups: Vec<(String, Vec<String>)> = inner
            .by_conversation
            .iter()
            .filter(|(_, ids)| ids.len() >= CONSOLIDATION_GROUP_MIN)
            .map(|(cid, ids)| (cid.clone(), ids.iter().cloned().collect()))
            .collect();

        for (conversation_id, ids) in groups {
            let mut members: Vec<ContextItem> =
                ids.iter().filter_map(|id| inner.remove(id)).collect();
            members.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            let earliest = members[0].timestamp;
            #[allow(clippy::cast_precision_loss)]
            let mean_importance =
                members.iter().map(|m| m.importance_score).sum::<f64>() / members.len() as f64;
            let content = self.summarizer.summarize(&members);

            let mut metadata = Metadata::new();
            metadata.insert(
                "type".to_string(),
                MetadataValue::from("consolidated"),
            );
            let mut summary = ContextItem::new(content, metadata)
                .with_conversation_id(conversation_id.clone())
                .with_timestamp(earliest);
            summary.importance_score = mean_importance;

            debug!(
                conversation_id = %conversation_id,
                members = members.len(),
                "consolidated conversation group"
            );
            inner.index(&summary);
            inner.items.insert(summary.id.clone(), summary);
            self.total_consolidations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), MetadataValue::from(*v)))
            .collect()
    }

    fn store(max_size: usize) -> SessionStore {
        SessionStore::new(SessionConfig {
            max_size,
            relevance_threshold: 0.1,
            consolidation_threshold: None,
        })
    }

    #[test]
    fn size_is_bounded_after_every_add() {
        let store = store(5);
        for i in 0..20 {
            store.add(ContextItem::new(format!("entry {i}"), Metadata::new()));
            assert!(store.len() <= 5);
        }
        assert_eq!(store.stats().total_evictions, 15);
    }

    #[test]
    fn importance_survives_eviction_pressure() {
        let store = store(5);
        for level in ["low", "normal", "high", "critical"] {
            store.add(ContextItem::new(
                format!("{level} priority note"),
                meta(&[("importance", level)]),
            ));
        }
        for i in 0..15 {
            store.add(ContextItem::new(
                format!("filler {i}"),
                meta(&[("importance", "low")]),
            ));
        }

        let all = store.search("", 10, None, None, None);
        let contents: Vec<&str> = all.iter().map(|i| i.content.as_str()).collect();
        assert!(contents.iter().any(|c| c.contains("critical")));
        assert!(contents.iter().any(|c| c.contains("high")));
    }

    #[test]
    fn re_add_with_same_id_updates_in_place() {
        let store = store(5);
        let original = ContextItem::new("first draft", Metadata::new());
        let id = original.id.clone();
        store.add(original);

        let revised = ContextItem::new("second draft", Metadata::new()).with_id(id.clone());
        store.add(revised);

        assert_eq!(store.len(), 1);
        let found = store.search("draft", 10, None, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "second draft");
        assert_eq!(found[0].id, id);
    }

    #[test]
    fn search_blends_coverage_and_jaccard() {
        let store = store(10);
        store.add(ContextItem::new(
            "the database migration finished",
            Metadata::new(),
        ));
        store.add(ContextItem::new("lunch menu for tuesday", Metadata::new()));

        let results = store.search("database migration", 10, None, None, None);
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("database"));
        assert!(results[0].relevance_score > 0.5);
    }

    #[test]
    fn relevance_threshold_drops_weak_matches() {
        let store = SessionStore::new(SessionConfig {
            max_size: 10,
            relevance_threshold: 0.9,
            consolidation_threshold: None,
        });
        store.add(ContextItem::new(
            "tangentially related words here",
            Metadata::new(),
        ));
        let results = store.search("related", 10, None, None, None);
        assert!(results.is_empty());
    }

    #[test]
    fn empty_query_orders_by_recency_and_importance() {
        let store = store(10);
        let older = ContextItem::new("older entry", Metadata::new())
            .with_timestamp(Utc::now() - chrono::Duration::hours(2));
        let newer = ContextItem::new("newer entry", Metadata::new());
        store.add(older);
        store.add(newer);

        let results = store.search("", 10, None, None, None);
        assert_eq!(results[0].content, "newer entry");
    }

    #[test]
    fn conversation_and_task_indices_narrow() {
        let store = store(10);
        store.add(
            ContextItem::new("alpha work", meta(&[("task_id", "t1")]))
                .with_conversation_id("c1"),
        );
        store.add(
            ContextItem::new("beta work", meta(&[("task_id", "t2")]))
                .with_conversation_id("c1"),
        );
        store.add(
            ContextItem::new("gamma work", meta(&[("task_id", "t1")]))
                .with_conversation_id("c2"),
        );

        assert_eq!(store.search("work", 10, None, Some("c1"), None).len(), 2);
        assert_eq!(store.search("work", 10, None, None, Some("t1")).len(), 2);
        assert_eq!(
            store
                .search("work", 10, None, Some("c1"), Some("t1"))
                .len(),
            1
        );
        assert!(store.search("work", 10, None, Some("c9"), None).is_empty());
    }

    #[test]
    fn filters_use_shared_predicate() {
        let store = store(10);
        store.add(ContextItem::new("a fact", meta(&[("type", "fact")])));
        store.add(ContextItem::new("a task", meta(&[("type", "task")])));

        let filter = MetadataFilter::new().eq("type", "fact");
        let results = store.search("a", 10, Some(&filter), None, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "a fact");
    }

    #[test]
    fn clear_conversation_removes_index_entries() {
        let store = store(10);
        store.add(ContextItem::new("one", Metadata::new()).with_conversation_id("c1"));
        store.add(ContextItem::new("two", Metadata::new()).with_conversation_id("c2"));

        store.clear_conversation("c1");
        assert_eq!(store.len(), 1);
        let stats = store.stats();
        assert_eq!(stats.conversation_count, 1);
    }

    #[test]
    fn clear_task_removes_index_entries() {
        let store = store(10);
        store.add(ContextItem::new("one", meta(&[("task_id", "t1")])));
        store.add(ContextItem::new("two", meta(&[("task_id", "t2")])));

        store.clear_task("t1");
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().task_count, 1);
    }

    #[test]
    fn expired_items_never_match() {
        let store = store(10);
        store.add(
            ContextItem::new("stale secret", Metadata::new())
                .with_expires_at(Utc::now() - chrono::Duration::seconds(1)),
        );
        assert!(store.search("secret", 10, None, None, None).is_empty());
        assert!(store.search("", 10, None, None, None).is_empty());
    }

    #[test]
    fn idle_conversations_are_cleaned_up() {
        let store = store(20);
        store.add(
            ContextItem::new("stale one", Metadata::new())
                .with_conversation_id("old")
                .with_timestamp(Utc::now() - chrono::Duration::hours(5)),
        );
        store.add(ContextItem::new("fresh one", Metadata::new()).with_conversation_id("new"));

        let removed = store.cleanup_idle_conversations(chrono::Duration::hours(2));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.search("", 10, None, Some("old"), None).is_empty());
        assert_eq!(store.search("", 10, None, Some("new"), None).len(), 1);
    }

    #[test]
    fn recently_accessed_conversations_survive_cleanup() {
        let store = store(20);
        store.add(
            ContextItem::new("revived entry", Metadata::new())
                .with_conversation_id("busy")
                .with_timestamp(Utc::now() - chrono::Duration::hours(5)),
        );
        // A search refreshes last_accessed on returned residents
        assert_eq!(store.search("revived", 10, None, None, None).len(), 1);

        let removed = store.cleanup_idle_conversations(chrono::Duration::hours(2));
        assert_eq!(removed, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn consolidation_replaces_group_with_summary() {
        let store = SessionStore::new(SessionConfig {
            max_size: 20,
            relevance_threshold: 0.1,
            consolidation_threshold: Some(5),
        });

        let base = Utc::now() - chrono::Duration::hours(1);
        for i in 0..5 {
            store.add(
                ContextItem::new(format!("step {i}"), meta(&[("importance", "high")]))
                    .with_conversation_id("c1")
                    .with_timestamp(base + chrono::Duration::minutes(i)),
            );
        }

        assert_eq!(store.len(), 1);
        let results = store.search("", 10, None, Some("c1"), None);
        assert_eq!(results.len(), 1);
        let summary = &results[0];
        assert_eq!(summary.timestamp, base);
        assert!((summary.importance_score - 1.2).abs() < 1e-9);
        assert_eq!(summary.content.lines().count(), 5);
        assert!(summary.content.lines().all(|l| l.starts_with('[')));
        assert_eq!(
            summary.metadata.get("type").and_then(MetadataValue::as_str),
            Some("consolidated")
        );
        assert_eq!(store.stats().total_consolidations, 1);
    }

    #[test]
    fn small_groups_are_left_alone() {
        let store = SessionStore::new(SessionConfig {
            max_size: 20,
            relevance_threshold: 0.1,
            consolidation_threshold: Some(3),
        });
        store.add(ContextItem::new("a", Metadata::new()).with_conversation_id("c1"));
        store.add(ContextItem::new("b", Metadata::new()).with_conversation_id("c1"));
        store.add(ContextItem::new("c", Metadata::new()).with_conversation_id("c2"));

        // Threshold reached but no conversation group has 5 members
        assert_eq!(store.len(), 3);
        assert_eq!(store.stats().total_consolidations, 0);
    }
}
