//! Value types for context items, requests, and responses
//!
//! Metadata is a typed map rather than an open string-to-any dictionary:
//! [`MetadataValue`] is a closed variant type, and the reserved keys
//! (`importance`, `persistence`, `type`, `task_id`) have typed accessors so
//! routing policy never string-matches ad hoc.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A metadata value: bool, number, string, or list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    Str(String),
    /// List of strings
    List(Vec<String>),
}

impl MetadataValue {
    /// View this value as a string slice, if it is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

/// Item metadata, ordered for deterministic serialization
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Importance level, parsed from the reserved `importance` metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Must be retained at nearly any cost
    Critical,
    /// Retained preferentially under pressure
    High,
    /// Default level
    Normal,
    /// First candidates for eviction
    Low,
    /// Ephemeral
    Minimal,
}

impl Importance {
    /// Construction-time importance score
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::High => 1.2,
            Self::Normal => 1.0,
            Self::Low => 0.8,
            Self::Minimal => 0.5,
        }
    }

    /// Retrieval-time score multiplier (minimal and unknown map to 1.0)
    #[must_use]
    pub const fn retrieval_multiplier(self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::High => 1.2,
            Self::Low => 0.8,
            Self::Normal | Self::Minimal => 1.0,
        }
    }

    /// Parse from the metadata string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }

    /// The metadata string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }
}

/// Persistence routing, parsed from the reserved `persistence` metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Routed to the long-term tier
    Permanent,
    /// Session-scoped (default)
    #[default]
    Session,
}

/// Content kind, parsed from the reserved `type` metadata key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// Durable fact
    Fact,
    /// User preference
    Preference,
    /// Task note
    Task,
    /// Recorded decision
    Decision,
    /// Conversational exchange
    Conversation,
    /// Reference knowledge
    Knowledge,
    /// Timestamped event
    Event,
    /// Synthetic summary produced by consolidation
    Consolidated,
    /// Unrecognized kind, carried through without routing effects
    Other(String),
}

impl ContentKind {
    /// Parse from the metadata string form
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "task" => Self::Task,
            "decision" => Self::Decision,
            "conversation" => Self::Conversation,
            "knowledge" => Self::Knowledge,
            "event" => Self::Event,
            "consolidated" => Self::Consolidated,
            other => Self::Other(other.to_string()),
        }
    }

    /// The metadata string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Task => "task",
            Self::Decision => "decision",
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
            Self::Event => "event",
            Self::Consolidated => "consolidated",
            Self::Other(s) => s,
        }
    }
}

/// Importance of an item per its metadata, defaulting to `Normal`
#[must_use]
pub fn importance_of(metadata: &Metadata) -> Importance {
    metadata
        .get("importance")
        .and_then(MetadataValue::as_str)
        .and_then(Importance::parse)
        .unwrap_or(Importance::Normal)
}

/// Persistence routing per metadata, defaulting to `Session`
#[must_use]
pub fn persistence_of(metadata: &Metadata) -> Persistence {
    match metadata.get("persistence").and_then(MetadataValue::as_str) {
        Some("permanent") => Persistence::Permanent,
        _ => Persistence::Session,
    }
}

/// Content kind per metadata, if the `type` key is present
#[must_use]
pub fn kind_of(metadata: &Metadata) -> Option<ContentKind> {
    metadata
        .get("type")
        .and_then(MetadataValue::as_str)
        .map(ContentKind::parse)
}

/// Task grouping key per metadata, if the `task_id` key is present
#[must_use]
pub fn task_id_of(metadata: &Metadata) -> Option<&str> {
    metadata.get("task_id").and_then(MetadataValue::as_str)
}

/// The atomic unit of stored context
///
/// An item's `id` is stable across tiers; the same id may live in several
/// tiers at once, and retrieval deduplicates by content hash on the way out.
/// `importance_score` is computed from metadata at construction and never
/// changes; `relevance_score` is transient per retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    /// Unique identifier (UUID-shaped, stable across tiers)
    #[serde(default = "generate_id")]
    pub id: String,

    /// UTF-8 content, non-empty for stored items
    pub content: String,

    /// Typed metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Optional conversation grouping key
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Optional task grouping key (mirrors `metadata.task_id`)
    #[serde(default)]
    pub task_id: Option<String>,

    /// Optional absolute expiry deadline
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Number of times readers returned this item
    #[serde(default)]
    pub access_count: u64,

    /// Last time a reader returned this item
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,

    /// Importance derived from metadata at construction
    pub importance_score: f64,

    /// Transient per-retrieval relevance
    #[serde(default)]
    pub relevance_score: f64,

    /// Optional precomputed embedding (filled lazily by backends)
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl ContextItem {
    /// Create a new item, deriving `importance_score` and `task_id` from metadata
    #[must_use]
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        let importance_score = importance_of(&metadata).weight();
        let task_id = task_id_of(&metadata).map(str::to_string);
        Self {
            id: generate_id(),
            content: content.into(),
            metadata,
            timestamp: Utc::now(),
            conversation_id: None,
            task_id,
            expires_at: None,
            access_count: 0,
            last_accessed: None,
            importance_score,
            relevance_score: 0.0,
            embedding: None,
        }
    }

    /// Set an explicit id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the conversation grouping key
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set an absolute expiry deadline
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set an explicit creation timestamp
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this item has expired as of `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Record a read: bump the access count and refresh `last_accessed`
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Some(Utc::now());
    }

    /// Importance level per metadata
    #[must_use]
    pub fn importance(&self) -> Importance {
        importance_of(&self.metadata)
    }

    /// Persistence routing per metadata
    #[must_use]
    pub fn persistence(&self) -> Persistence {
        persistence_of(&self.metadata)
    }

    /// Content kind per metadata
    #[must_use]
    pub fn kind(&self) -> Option<ContentKind> {
        kind_of(&self.metadata)
    }
}

/// Retrieval strategy for the long-term tier and response assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// Newest first, no relevance scoring
    Recency,
    /// Relevance scoring without backend fan-out
    Relevance,
    /// Weighted fusion of keyword, vector, and graph components
    Hybrid,
    /// Vector backend only
    Semantic,
    /// BM25 only
    Keyword,
    /// Graph backend only
    Graph,
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        Self::Hybrid
    }
}

impl RetrievalStrategy {
    /// The wire string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Relevance => "relevance",
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Graph => "graph",
        }
    }
}

/// A retrieval request against the tiered store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    /// Query text; empty means pure recency
    #[serde(default)]
    pub query: String,

    /// Maximum number of items to return (>= 1)
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Optional output token budget (estimated tokens, chars / 4)
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Search the immediate tier
    #[serde(default = "default_true")]
    pub include_immediate: bool,

    /// Search the session tier
    #[serde(default = "default_true")]
    pub include_session: bool,

    /// Search the long-term tier
    #[serde(default = "default_true")]
    pub include_long_term: bool,

    /// Retrieval strategy
    #[serde(default)]
    pub strategy: RetrievalStrategy,

    /// Metadata filter predicate
    #[serde(default)]
    pub filters: Option<crate::filter::MetadataFilter>,

    /// Restrict to one conversation
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Restrict to one task
    #[serde(default)]
    pub task_id: Option<String>,

    /// Only items created at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    /// Only items created at or before this instant
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: default_max_results(),
            max_tokens: None,
            include_immediate: true,
            include_session: true,
            include_long_term: true,
            strategy: RetrievalStrategy::default(),
            filters: None,
            conversation_id: None,
            task_id: None,
            since: None,
            until: None,
        }
    }
}

impl ContextRequest {
    /// Create a request for `query` with defaults for everything else
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the result count limit
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the output token budget
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the tier mask
    #[must_use]
    pub const fn with_tiers(mut self, immediate: bool, session: bool, long_term: bool) -> Self {
        self.include_immediate = immediate;
        self.include_session = session;
        self.include_long_term = long_term;
        self
    }

    /// Set the retrieval strategy
    #[must_use]
    pub const fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the metadata filter predicate
    #[must_use]
    pub fn with_filters(mut self, filters: crate::filter::MetadataFilter) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Restrict to one conversation
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Restrict to one task
    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Stable cache key: SHA-256 over the canonical serialized request
    ///
    /// Metadata maps are ordered (`BTreeMap`) and struct fields serialize in
    /// declaration order, so equal requests hash equally.
    #[must_use]
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};

        let canonical =
            serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.query));
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A retrieval response: items in score-descending order plus provenance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextResponse {
    /// Items, highest score first
    pub items: Vec<ContextItem>,

    /// Strategy that produced the long-term component
    pub strategy: RetrievalStrategy,

    /// Items contributed by the immediate tier (pre-dedup)
    pub immediate_count: usize,

    /// Items contributed by the session tier (pre-dedup)
    pub session_count: usize,

    /// Items contributed by the long-term tier (pre-dedup)
    pub long_term_count: usize,

    /// Whether this response was served from the response cache
    pub cache_hit: bool,

    /// Estimated token total across returned items
    pub total_tokens: usize,

    /// Backends that degraded during this retrieval
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_errors: Vec<String>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_results() -> usize {
    10
}
