//! Metadata filter predicate shared by all searchable tiers
//!
//! A filter matches an item iff every clause matches: scalar clauses require
//! equality with the item's metadata value, list clauses require membership.
//! A missing key never matches, comparisons are case-sensitive, and values of
//! mismatched type never match. BM25 and the session store honor the same
//! predicate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Metadata, MetadataValue};

/// One filter clause value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Membership: the item's value must be one of these
    AnyOf(Vec<MetadataValue>),
    /// Equality with the item's value
    Scalar(MetadataValue),
}

impl FilterValue {
    fn matches(&self, value: &MetadataValue) -> bool {
        match self {
            Self::Scalar(expected) => expected == value,
            Self::AnyOf(allowed) => allowed.contains(value),
        }
    }
}

/// Conjunctive metadata predicate: every clause must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, FilterValue>,
}

impl MetadataFilter {
    /// Create an empty filter (matches everything)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.clauses
            .insert(key.into(), FilterValue::Scalar(value.into()));
        self
    }

    /// Add a membership clause
    #[must_use]
    pub fn any_of<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetadataValue>,
    {
        self.clauses.insert(
            key.into(),
            FilterValue::AnyOf(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Whether the filter has no clauses
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the predicate against item metadata
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(key, clause)| {
            metadata
                .get(key)
                .is_some_and(|value| clause.matches(value))
        })
    }
}
