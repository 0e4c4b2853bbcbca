//! Store-agnostic query model.
//!
//! Records are untyped JSON objects; filters are conjunctions of simple
//! field comparisons that every store (SQL or in-memory) can evaluate with
//! the same semantics. A missing field behaves like SQL `NULL`: it only
//! matches `Eq(Null)` / `Ne(non-null)`-style null tests.

use crate::Timestamp;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

/// A row of any category.
pub type Record = serde_json::Map<String, JsonValue>;

// ============================================================================
// STATEMENT CLASSIFICATION
// ============================================================================

/// Statement verb used to bucket query statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryVerb {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryVerb {
    pub const ALL: [QueryVerb; 5] = [
        QueryVerb::Select,
        QueryVerb::Insert,
        QueryVerb::Update,
        QueryVerb::Delete,
        QueryVerb::Other,
    ];

    /// Classify a statement by its first token.
    ///
    /// This is a heuristic, not a parser: CTEs, multi-statement strings and
    /// dialect extensions all land in `Other`.
    pub fn classify(text: &str) -> Self {
        let first = text
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("");

        if first.eq_ignore_ascii_case("select") {
            Self::Select
        } else if first.eq_ignore_ascii_case("insert") {
            Self::Insert
        } else if first.eq_ignore_ascii_case("update") {
            Self::Update
        } else if first.eq_ignore_ascii_case("delete") {
            Self::Delete
        } else {
            Self::Other
        }
    }

    /// Dense index, used by fixed-size per-verb tables.
    pub fn index(self) -> usize {
        match self {
            Self::Select => 0,
            Self::Insert => 1,
            Self::Update => 2,
            Self::Delete => 3,
            Self::Other => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for QueryVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Right-hand side of a filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Compare a stored JSON value against this filter value.
    ///
    /// Returns `None` when the two are not comparable (type mismatch or
    /// null on either side), which every operator treats as "no match".
    pub fn compare(&self, stored: &JsonValue) -> Option<Ordering> {
        match (self, stored) {
            (FilterValue::Bool(b), JsonValue::Bool(s)) => Some(s.cmp(b)),
            (FilterValue::Int(i), JsonValue::Number(n)) => n.as_f64()?.partial_cmp(&(*i as f64)),
            (FilterValue::Float(f), JsonValue::Number(n)) => n.as_f64()?.partial_cmp(f),
            (FilterValue::Text(t), JsonValue::String(s)) => Some(s.as_str().cmp(t.as_str())),
            (FilterValue::Timestamp(ts), JsonValue::String(s)) => {
                let parsed = DateTime::parse_from_rfc3339(s).ok()?;
                Some(parsed.with_timezone(&chrono::Utc).cmp(ts))
            }
            _ => None,
        }
    }

    fn equals(&self, stored: &JsonValue) -> bool {
        self.compare(stored) == Some(Ordering::Equal)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Timestamp> for FilterValue {
    fn from(v: Timestamp) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

/// A single `field <op> value` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: FilterValue,
}

impl Condition {
    /// Evaluate this condition against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let stored = record.get(&self.field).unwrap_or(&JsonValue::Null);

        if let FilterValue::Null = self.value {
            return match self.op {
                CompareOp::Eq => stored.is_null(),
                CompareOp::Ne => !stored.is_null(),
                _ => false,
            };
        }

        match (&self.op, &self.value) {
            (CompareOp::In, FilterValue::List(items)) => items.iter().any(|v| v.equals(stored)),
            (CompareOp::NotIn, FilterValue::List(items)) => {
                !stored.is_null() && !items.iter().any(|v| v.equals(stored))
            }
            (CompareOp::In | CompareOp::NotIn, _) => false,
            (op, value) => match value.compare(stored) {
                Some(ordering) => match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::In | CompareOp::NotIn => false,
                },
                None => false,
            },
        }
    }
}

/// Conjunction of conditions. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn with(mut self, field: impl Into<String>, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Eq, value)
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Ne, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Lt, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Lte, value)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Gt, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::Gte, value)
    }

    pub fn is_in(self, field: impl Into<String>, values: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::In, values)
    }

    pub fn not_in(self, field: impl Into<String>, values: impl Into<FilterValue>) -> Self {
        self.with(field, CompareOp::NotIn, values)
    }

    /// True when every condition matches the record.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Names of every field referenced by this filter.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.field.as_str())
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}
