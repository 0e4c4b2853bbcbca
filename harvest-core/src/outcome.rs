//! Results returned by the batch writer and the retention sweeper.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one committed chunk of a batch insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Zero-based chunk position within the batch.
    pub index: usize,
    /// Number of records sent in this chunk.
    pub attempted: usize,
    /// Rows actually inserted (duplicates are skipped, so this may be lower).
    pub inserted: u64,
}

/// Deleted-row counts per record category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionResult {
    counts: BTreeMap<String, u64>,
}

impl RetentionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the deleted count for a category, replacing any earlier value.
    pub fn record(&mut self, category: impl Into<String>, deleted: u64) {
        self.counts.insert(category.into(), deleted);
    }

    pub fn get(&self, category: &str) -> Option<u64> {
        self.counts.get(category).copied()
    }

    /// Sum of all per-category counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
