//! Scoring primitives shared by the tiers and the retrieval pipeline
//!
//! # Retrieval score
//!
//! Every candidate surfacing from a tier is scored as
//!
//! ```text
//! score = tier_weight · recency · (0.5 + 0.5 · relevance) · importance_multiplier
//! ```
//!
//! where `tier_weight` is 1.0 / 0.8 / 0.6 for immediate / session / long-term,
//! `recency = 1 / (1 + age_hours / 24)`, and `relevance` is the Jaccard
//! similarity of query and content word sets (or a fused backend score for
//! long-term candidates).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::ContextItem;

/// Memory tier, ordered hottest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Hot FIFO cache
    Immediate,
    /// Bounded working set
    Session,
    /// Backend-backed durable store
    LongTerm,
}

impl Tier {
    /// Retrieval-score weight for candidates from this tier
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Immediate => 1.0,
            Self::Session => 0.8,
            Self::LongTerm => 0.6,
        }
    }

    /// Human-readable tier name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Session => "session",
            Self::LongTerm => "long_term",
        }
    }
}

/// Estimate tokens for a text: roughly four characters per token
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Deduplication key: SHA-256 over trimmed, lowercased content
#[must_use]
pub fn dedup_key(content: &str) -> String {
    let normalized = content.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Jaccard similarity of two word sets
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            intersection as f64 / union as f64
        }
    }
}

/// Split text into a lowercase whitespace-delimited word set
#[must_use]
pub fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Cross-tier retrieval score for one candidate
///
/// `relevance_override` carries an already-fused backend score for long-term
/// candidates; otherwise relevance is the query/content Jaccard similarity
/// (zero when the query is empty).
#[must_use]
pub fn retrieval_score(
    item: &ContextItem,
    query_words: &HashSet<String>,
    tier: Tier,
    now: DateTime<Utc>,
    relevance_override: Option<f64>,
) -> f64 {
    let age_hours = age_hours(item.timestamp, now);
    let recency = 1.0 / (1.0 + age_hours / 24.0);

    let relevance = relevance_override.unwrap_or_else(|| {
        if query_words.is_empty() {
            0.0
        } else {
            jaccard(query_words, &word_set(&item.content))
        }
    });

    let importance_multiplier = item.importance().retrieval_multiplier();

    tier.weight() * recency * (0.5 + 0.5 * relevance) * importance_multiplier
}

/// Age in fractional hours, clamped to zero for future timestamps
#[must_use]
pub fn age_hours(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = (now - then).num_milliseconds() as f64;
    (millis / 3_600_000.0).max(0.0)
}
