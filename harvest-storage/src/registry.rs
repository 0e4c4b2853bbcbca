//! Category registry.
//!
//! Callers address records by category name ("factory", "access_log", ...).
//! The registry maps each name to a typed [`TableSpec`] once at startup, so
//! table and column identifiers are never taken from caller input.

use std::collections::BTreeMap;
use std::sync::Arc;

use harvest_core::{
    CompareOp, Filter, FilterValue, HarvestError, HarvestResult, StorageError, ValidationError,
};

use crate::store::FindQuery;

/// Column storage type, used to bind parameters with the right SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    BigInt,
    Double,
    Bool,
    Timestamp,
    Json,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// A one-to-many relation that can be embedded via `include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Name used in `include` and as the embedded field name.
    pub name: String,
    /// Table holding the related rows.
    pub table: String,
    /// Column on the related table that references this table's primary key.
    pub foreign_key: String,
}

/// Typed description of the table backing a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub category: String,
    pub table: String,
    pub primary_key: String,
    pub created_at: String,
    pub columns: Vec<Column>,
    pub relations: Vec<Relation>,
}

impl TableSpec {
    /// Start a spec with `id` as primary key and `created_at` as the
    /// creation timestamp. Both columns still have to be declared.
    pub fn new(category: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            created_at: "created_at".to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn created_at(mut self, column: impl Into<String>) -> Self {
        self.created_at = column.into();
        self
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
        });
        self
    }

    pub fn relation(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            table: table.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Look up a declared column.
    pub fn column_def(&self, name: &str) -> HarvestResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.unknown_field(name))
    }

    pub fn relation_def(&self, name: &str) -> HarvestResult<&Relation> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| self.unknown_field(name))
    }

    fn unknown_field(&self, field: &str) -> HarvestError {
        HarvestError::Validation(ValidationError::UnknownField {
            category: self.category.clone(),
            field: field.to_string(),
        })
    }

    /// Check that a filter only references declared, filterable columns and
    /// uses operators with compatible operands.
    pub fn validate_filter(&self, filter: &Filter) -> HarvestResult<()> {
        for condition in &filter.conditions {
            let column = self.column_def(&condition.field)?;
            if column.column_type == ColumnType::Json {
                return Err(HarvestError::invalid_value(
                    &condition.field,
                    "json columns cannot be filtered",
                ));
            }
            let is_list = matches!(condition.value, FilterValue::List(_));
            match condition.op {
                CompareOp::In | CompareOp::NotIn if !is_list => {
                    return Err(HarvestError::invalid_value(
                        &condition.field,
                        "IN / NOT IN require a list operand",
                    ));
                }
                CompareOp::Eq | CompareOp::Ne | CompareOp::Lt | CompareOp::Lte
                | CompareOp::Gt | CompareOp::Gte
                    if is_list =>
                {
                    return Err(HarvestError::invalid_value(
                        &condition.field,
                        "list operands are only valid with IN / NOT IN",
                    ));
                }
                CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte
                    if condition.value == FilterValue::Null =>
                {
                    return Err(HarvestError::invalid_value(
                        &condition.field,
                        "NULL can only be compared with Eq / Ne",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check every identifier a find query references.
    pub fn validate_find(&self, query: &FindQuery) -> HarvestResult<()> {
        self.validate_filter(&query.filter)?;
        for order in &query.order_by {
            self.column_def(&order.field)?;
        }
        if let Some(select) = &query.select {
            for field in select {
                self.column_def(field)?;
            }
        }
        for relation in &query.include {
            self.relation_def(relation)?;
        }
        Ok(())
    }
}

/// Maps category names to table specs.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    tables: BTreeMap<String, Arc<TableSpec>>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a category, replacing any earlier spec with the same name.
    pub fn register(&mut self, spec: TableSpec) -> &mut Self {
        self.tables.insert(spec.category.clone(), Arc::new(spec));
        self
    }

    pub fn with(mut self, spec: TableSpec) -> Self {
        self.register(spec);
        self
    }

    /// Resolve a category name.
    pub fn resolve(&self, category: &str) -> HarvestResult<Arc<TableSpec>> {
        self.tables.get(category).cloned().ok_or_else(|| {
            HarvestError::Storage(StorageError::UnknownCategory {
                category: category.to_string(),
            })
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Category names of the traceability product.
pub mod categories {
    pub const FACTORY: &str = "factory";
    pub const USER: &str = "user";
    pub const WHITELIST: &str = "whitelist";
    pub const TRACE_RECORD: &str = "trace_record";
    pub const SYSTEM_LOG: &str = "system_log";
    pub const ACCESS_LOG: &str = "access_log";
    pub const CACHE_METRIC: &str = "cache_metric";
}

/// Registry of every category the product stores.
pub fn default_registry() -> CategoryRegistry {
    use categories::*;
    use ColumnType::*;

    CategoryRegistry::new()
        .with(
            TableSpec::new(FACTORY, "factories")
                .column("id", Uuid)
                .column("name", Text)
                .column("region", Text)
                .column("license_no", Text)
                .column("status", Text)
                .column("created_at", Timestamp)
                .column("updated_at", Timestamp)
                .relation("users", "users", "factory_id")
                .relation("whitelist", "whitelist_entries", "factory_id"),
        )
        .with(
            TableSpec::new(USER, "users")
                .column("id", Uuid)
                .column("factory_id", Uuid)
                .column("email", Text)
                .column("display_name", Text)
                .column("role", Text)
                .column("status", Text)
                .column("created_at", Timestamp),
        )
        .with(
            TableSpec::new(WHITELIST, "whitelist_entries")
                .column("id", Uuid)
                .column("factory_id", Uuid)
                .column("phone", Text)
                .column("note", Text)
                .column("created_at", Timestamp),
        )
        .with(
            TableSpec::new(TRACE_RECORD, "trace_records")
                .column("id", Uuid)
                .column("factory_id", Uuid)
                .column("batch_code", Text)
                .column("product_name", Text)
                .column("stage", Text)
                .column("payload", Json)
                .column("created_at", Timestamp),
        )
        .with(
            TableSpec::new(SYSTEM_LOG, "system_logs")
                .column("id", BigInt)
                .column("level", Text)
                .column("module", Text)
                .column("message", Text)
                .column("context", Json)
                .column("created_at", Timestamp),
        )
        .with(
            TableSpec::new(ACCESS_LOG, "api_access_logs")
                .column("id", BigInt)
                .column("method", Text)
                .column("path", Text)
                .column("status_code", BigInt)
                .column("duration_ms", Double)
                .column("user_id", Uuid)
                .column("created_at", Timestamp),
        )
        .with(
            TableSpec::new(CACHE_METRIC, "cache_metrics")
                .column("id", BigInt)
                .column("cache_key", Text)
                .column("hits", BigInt)
                .column("misses", BigInt)
                .column("expires_at", Timestamp)
                .column("created_at", Timestamp),
        )
}
