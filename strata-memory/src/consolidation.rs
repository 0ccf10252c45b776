//! Consolidation of session items into synthetic summaries
//!
//! When the session store crosses its consolidation threshold, items are
//! grouped by conversation and each large-enough group is replaced by a
//! single synthetic item. The summary text comes from a [`Summarizer`]; the
//! default renders a compact timeline. An LLM-backed summarizer can be
//! substituted behind the same contract.

use strata_core::types::ContextItem;

/// Produces the content of a consolidated summary item
///
/// `items` arrive sorted by timestamp ascending and are guaranteed non-empty.
pub trait Summarizer: Send + Sync {
    /// Render the group into a single summary text
    fn summarize(&self, items: &[ContextItem]) -> String;
}

/// Default summarizer: one `[HH:MM] content` line per member, in time order
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineSummarizer;

impl Summarizer for TimelineSummarizer {
    fn summarize(&self, items: &[ContextItem]) -> String {
        items
            .iter()
            .map(|item| format!("[{}] {}", item.timestamp.format("%H:%M"), item.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
