//! Bounded log of slow queries.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use harvest_core::QueryVerb;
use serde::{Deserialize, Serialize};

/// One slow statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub verb: QueryVerb,
    pub duration_ms: f64,
    pub recorded_at: DateTime<Utc>,
    /// Statement text, cut to the monitor's text limit.
    pub text: String,
}

/// Fixed-capacity ring buffer of slow queries.
///
/// Once full, each new record displaces the oldest one. `total_recorded`
/// keeps counting past the capacity.
#[derive(Debug, Clone)]
pub struct SlowQueryLog {
    records: VecDeque<QueryRecord>,
    capacity: usize,
    total_recorded: u64,
}

impl SlowQueryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            total_recorded: 0,
        }
    }

    pub fn push(&mut self, record: QueryRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total_recorded += 1;
    }

    /// Up to `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<QueryRecord> {
        self.records.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.total_recorded = 0;
    }
}

/// Cut `text` to at most `limit` characters.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
