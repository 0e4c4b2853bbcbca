//! Parameterised PostgreSQL rendering of the structured store operations.
//!
//! Identifiers always come from a registered [`TableSpec`] and are quoted;
//! every caller-supplied value is bound as a positional parameter. Stores
//! that do not speak SQL still render statements to get the same
//! validation and to report the statement text to the query monitor.

use chrono::DateTime;
use harvest_core::{
    CompareOp, Condition, Direction, Filter, FilterValue, HarvestError, HarvestResult, Record,
    Timestamp,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::registry::{Column, ColumnType, TableSpec};
use crate::store::{FindQuery, InsertOptions};

/// Alias of the base table inside rendered statements.
const BASE: &str = "b";

// ============================================================================
// PARAMETERS
// ============================================================================

/// A typed, nullable statement parameter.
///
/// Every variant carries an `Option` so that a `NULL` still binds with the
/// column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    Bool(Option<bool>),
    Timestamp(Option<Timestamp>),
    Json(Option<JsonValue>),
    Uuid(Option<Uuid>),
}

impl SqlValue {
    /// Typed `NULL` for a column.
    pub fn null(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Text => Self::Text(None),
            ColumnType::BigInt => Self::BigInt(None),
            ColumnType::Double => Self::Double(None),
            ColumnType::Bool => Self::Bool(None),
            ColumnType::Timestamp => Self::Timestamp(None),
            ColumnType::Json => Self::Json(None),
            ColumnType::Uuid => Self::Uuid(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Text(v) => v.is_none(),
            Self::BigInt(v) => v.is_none(),
            Self::Double(v) => v.is_none(),
            Self::Bool(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::Json(v) => v.is_none(),
            Self::Uuid(v) => v.is_none(),
        }
    }

    /// Convert a stored JSON value for binding into `column`.
    pub fn from_json(column: &Column, value: &JsonValue) -> HarvestResult<Self> {
        if value.is_null() {
            return Ok(Self::null(column.column_type));
        }
        let mismatch = || {
            HarvestError::invalid_value(
                &column.name,
                format!("{} is not a valid {:?} value", value, column.column_type),
            )
        };
        let converted = match column.column_type {
            ColumnType::Text => Self::Text(Some(value.as_str().ok_or_else(mismatch)?.to_string())),
            ColumnType::BigInt => Self::BigInt(Some(value.as_i64().ok_or_else(mismatch)?)),
            ColumnType::Double => Self::Double(Some(value.as_f64().ok_or_else(mismatch)?)),
            ColumnType::Bool => Self::Bool(Some(value.as_bool().ok_or_else(mismatch)?)),
            ColumnType::Timestamp => {
                let text = value.as_str().ok_or_else(mismatch)?;
                Self::Timestamp(Some(parse_timestamp(&column.name, text)?))
            }
            ColumnType::Json => Self::Json(Some(value.clone())),
            ColumnType::Uuid => {
                let text = value.as_str().ok_or_else(mismatch)?;
                Self::Uuid(Some(parse_uuid(&column.name, text)?))
            }
        };
        Ok(converted)
    }

    /// Convert a scalar filter operand for comparison against `column`.
    pub fn from_filter(column: &Column, value: &FilterValue) -> HarvestResult<Self> {
        let mismatch = || {
            HarvestError::invalid_value(
                &column.name,
                format!("{:?} cannot be compared with a {:?} column", value, column.column_type),
            )
        };
        let converted = match (column.column_type, value) {
            (ty, FilterValue::Null) => Self::null(ty),
            (ColumnType::Text, FilterValue::Text(s)) => Self::Text(Some(s.clone())),
            (ColumnType::BigInt, FilterValue::Int(i)) => Self::BigInt(Some(*i)),
            (ColumnType::Double, FilterValue::Int(i)) => Self::Double(Some(*i as f64)),
            (ColumnType::Double, FilterValue::Float(f)) => Self::Double(Some(*f)),
            (ColumnType::Bool, FilterValue::Bool(b)) => Self::Bool(Some(*b)),
            (ColumnType::Timestamp, FilterValue::Timestamp(ts)) => Self::Timestamp(Some(*ts)),
            (ColumnType::Timestamp, FilterValue::Text(s)) => {
                Self::Timestamp(Some(parse_timestamp(&column.name, s)?))
            }
            (ColumnType::Uuid, FilterValue::Text(s)) => Self::Uuid(Some(parse_uuid(&column.name, s)?)),
            _ => return Err(mismatch()),
        };
        Ok(converted)
    }
}

fn parse_timestamp(field: &str, text: &str) -> HarvestResult<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|e| HarvestError::invalid_value(field, format!("invalid RFC 3339 timestamp: {}", e)))
}

fn parse_uuid(field: &str, text: &str) -> HarvestResult<Uuid> {
    Uuid::parse_str(text).map_err(|e| HarvestError::invalid_value(field, format!("invalid uuid: {}", e)))
}

// ============================================================================
// STATEMENTS
// ============================================================================

/// Rendered SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(column: &str) -> String {
    format!("{}.{}", BASE, quote_ident(column))
}

/// Multi-row `INSERT`. Columns are the union of keys across `records` in
/// declaration order; a record missing one of them gets `DEFAULT`.
pub fn render_insert(
    table: &TableSpec,
    records: &[Record],
    options: InsertOptions,
) -> HarvestResult<Statement> {
    if records.is_empty() {
        return Err(HarvestError::invalid_value("records", "insert requires at least one record"));
    }

    for record in records {
        for key in record.keys() {
            table.column_def(key)?;
        }
    }

    let columns: Vec<&Column> = table
        .columns
        .iter()
        .filter(|c| records.iter().any(|r| r.contains_key(&c.name)))
        .collect();

    let mut statement = Statement {
        text: String::new(),
        params: Vec::new(),
    };

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut slots = Vec::with_capacity(columns.len());
        for column in &columns {
            match record.get(&column.name) {
                Some(value) => {
                    let value = SqlValue::from_json(column, value)?;
                    slots.push(statement.bind(value));
                }
                None => slots.push("DEFAULT".to_string()),
            }
        }
        rows.push(format!("({})", slots.join(", ")));
    }

    let column_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    statement.text = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(&table.table),
        column_list,
        rows.join(", ")
    );
    if options.skip_duplicates {
        statement.text.push_str(" ON CONFLICT DO NOTHING");
    }
    Ok(statement)
}

/// `SELECT` returning one JSON object per row, with relations embedded as
/// JSON arrays.
pub fn render_find(table: &TableSpec, query: &FindQuery) -> HarvestResult<Statement> {
    table.validate_find(query)?;

    let mut statement = Statement {
        text: String::new(),
        params: Vec::new(),
    };

    let mut projection: Vec<String> = match &query.select {
        Some(fields) => fields.iter().map(|f| qualified(f)).collect(),
        None => vec![format!("{}.*", BASE)],
    };
    for name in &query.include {
        let relation = table.relation_def(name)?;
        projection.push(format!(
            "(SELECT coalesce(jsonb_agg(r), '[]'::jsonb) FROM {} r WHERE r.{} = {}) AS {}",
            quote_ident(&relation.table),
            quote_ident(&relation.foreign_key),
            qualified(&table.primary_key),
            quote_ident(&relation.name)
        ));
    }

    let mut inner = format!(
        "SELECT {} FROM {} {}",
        projection.join(", "),
        quote_ident(&table.table),
        BASE
    );
    push_where(&mut inner, table, &query.filter, &mut statement)?;

    if !query.order_by.is_empty() {
        let order = query
            .order_by
            .iter()
            .map(|o| {
                let dir = match o.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {}", qualified(&o.field), dir)
            })
            .collect::<Vec<_>>()
            .join(", ");
        inner.push_str(" ORDER BY ");
        inner.push_str(&order);
    }

    if let Some(limit) = query.limit {
        let p = statement.bind(SqlValue::BigInt(Some(to_i64("limit", limit)?)));
        inner.push_str(&format!(" LIMIT {}", p));
    }
    if query.skip > 0 {
        let p = statement.bind(SqlValue::BigInt(Some(to_i64("skip", query.skip)?)));
        inner.push_str(&format!(" OFFSET {}", p));
    }

    statement.text = format!("SELECT to_jsonb(t) AS row FROM ({}) t", inner);
    Ok(statement)
}

/// `SELECT COUNT(*)` over the rows matching `filter`.
pub fn render_count(table: &TableSpec, filter: &Filter) -> HarvestResult<Statement> {
    table.validate_filter(filter)?;
    let mut statement = Statement {
        text: String::new(),
        params: Vec::new(),
    };
    let mut text = format!("SELECT COUNT(*) AS count FROM {} {}", quote_ident(&table.table), BASE);
    push_where(&mut text, table, filter, &mut statement)?;
    statement.text = text;
    Ok(statement)
}

/// `DELETE` of the rows matching `filter`. An empty filter deletes every row.
pub fn render_delete(table: &TableSpec, filter: &Filter) -> HarvestResult<Statement> {
    table.validate_filter(filter)?;
    let mut statement = Statement {
        text: String::new(),
        params: Vec::new(),
    };
    let mut text = format!("DELETE FROM {} AS {}", quote_ident(&table.table), BASE);
    push_where(&mut text, table, filter, &mut statement)?;
    statement.text = text;
    Ok(statement)
}

fn to_i64(field: &str, value: u64) -> HarvestResult<i64> {
    i64::try_from(value).map_err(|_| HarvestError::invalid_value(field, "value out of range"))
}

fn push_where(
    text: &mut String,
    table: &TableSpec,
    filter: &Filter,
    statement: &mut Statement,
) -> HarvestResult<()> {
    if filter.is_empty() {
        return Ok(());
    }
    let mut clauses = Vec::with_capacity(filter.conditions.len());
    for condition in &filter.conditions {
        clauses.push(render_condition(table, condition, statement)?);
    }
    text.push_str(" WHERE ");
    text.push_str(&clauses.join(" AND "));
    Ok(())
}

fn render_condition(
    table: &TableSpec,
    condition: &Condition,
    statement: &mut Statement,
) -> HarvestResult<String> {
    let column = table.column_def(&condition.field)?;
    let lhs = qualified(&column.name);

    if let CompareOp::In | CompareOp::NotIn = condition.op {
        let items = match &condition.value {
            FilterValue::List(items) => items,
            _ => {
                return Err(HarvestError::invalid_value(
                    &condition.field,
                    "IN / NOT IN require a list operand",
                ))
            }
        };
        // NULL members never match; dropping them keeps NOT IN usable.
        let mut placeholders = Vec::with_capacity(items.len());
        for item in items.iter().filter(|v| **v != FilterValue::Null) {
            let value = SqlValue::from_filter(column, item)?;
            placeholders.push(statement.bind(value));
        }
        let in_list = condition.op == CompareOp::In;
        return Ok(match (in_list, placeholders.is_empty()) {
            (true, true) => "FALSE".to_string(),
            (false, true) => format!("{} IS NOT NULL", lhs),
            (true, false) => format!("{} IN ({})", lhs, placeholders.join(", ")),
            (false, false) => format!("{} NOT IN ({})", lhs, placeholders.join(", ")),
        });
    }

    if condition.value == FilterValue::Null {
        return match condition.op {
            CompareOp::Eq => Ok(format!("{} IS NULL", lhs)),
            CompareOp::Ne => Ok(format!("{} IS NOT NULL", lhs)),
            _ => Err(HarvestError::invalid_value(
                &condition.field,
                "NULL can only be compared with Eq / Ne",
            )),
        };
    }

    let operator = match condition.op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::In | CompareOp::NotIn => {
            return Err(HarvestError::invalid_value(
                &condition.field,
                "IN / NOT IN require a list operand",
            ))
        }
    };
    let value = SqlValue::from_filter(column, &condition.value)?;
    let placeholder = statement.bind(value);
    Ok(format!("{} {} {}", lhs, operator, placeholder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{categories, default_registry};
    use chrono::TimeZone;
    use harvest_core::OrderBy;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("record fixture must be an object"),
        }
    }

    fn spec(category: &str) -> std::sync::Arc<TableSpec> {
        default_registry().resolve(category).unwrap()
    }

    #[test]
    fn test_render_insert_fills_missing_columns_with_default() {
        let logs = spec(categories::SYSTEM_LOG);
        let records = vec![
            record(json!({ "level": "info", "message": "started" })),
            record(json!({ "level": "error", "module": "sync", "message": "lost" })),
        ];

        let stmt = render_insert(&logs, &records, InsertOptions::skip_duplicates()).unwrap();
        assert_eq!(
            stmt.text,
            "INSERT INTO \"system_logs\" (\"level\", \"module\", \"message\") \
             VALUES ($1, DEFAULT, $2), ($3, $4, $5) ON CONFLICT DO NOTHING"
        );
        assert_eq!(stmt.params.len(), 5);
        assert_eq!(stmt.params[0], SqlValue::Text(Some("info".to_string())));
    }

    #[test]
    fn test_render_insert_rejects_unknown_column() {
        let logs = spec(categories::SYSTEM_LOG);
        let records = vec![record(json!({ "level": "info", "severity": 3 }))];
        assert!(render_insert(&logs, &records, InsertOptions::default()).is_err());
    }

    #[test]
    fn test_render_insert_type_mismatch() {
        let access = spec(categories::ACCESS_LOG);
        let records = vec![record(json!({ "status_code": "ok" }))];
        assert!(render_insert(&access, &records, InsertOptions::default()).is_err());

        let records = vec![record(json!({ "status_code": null, "duration_ms": 12 }))];
        let stmt = render_insert(&access, &records, InsertOptions::default()).unwrap();
        assert_eq!(stmt.params, vec![SqlValue::BigInt(None), SqlValue::Double(Some(12.0))]);
        assert!(!stmt.text.contains("ON CONFLICT"));
    }

    #[test]
    fn test_render_find_with_filter_order_and_window() {
        let access = spec(categories::ACCESS_LOG);
        let query = FindQuery {
            filter: Filter::all().lt("status_code", 400).eq("method", "GET"),
            order_by: vec![OrderBy::desc("created_at")],
            skip: 40,
            limit: Some(20),
            select: Some(vec!["id".to_string(), "path".to_string()]),
            include: Vec::new(),
        };

        let stmt = render_find(&access, &query).unwrap();
        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(t) AS row FROM (SELECT b.\"id\", b.\"path\" FROM \"api_access_logs\" b \
             WHERE b.\"status_code\" < $1 AND b.\"method\" = $2 \
             ORDER BY b.\"created_at\" DESC LIMIT $3 OFFSET $4) t"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::BigInt(Some(400)),
                SqlValue::Text(Some("GET".to_string())),
                SqlValue::BigInt(Some(20)),
                SqlValue::BigInt(Some(40)),
            ]
        );
    }

    #[test]
    fn test_render_find_embeds_relations() {
        let factories = spec(categories::FACTORY);
        let query = FindQuery {
            include: vec!["users".to_string()],
            ..Default::default()
        };
        let stmt = render_find(&factories, &query).unwrap();
        assert!(stmt.text.contains(
            "(SELECT coalesce(jsonb_agg(r), '[]'::jsonb) FROM \"users\" r WHERE r.\"factory_id\" = b.\"id\") AS \"users\""
        ));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_render_count_and_delete() {
        let logs = spec(categories::SYSTEM_LOG);
        let cutoff = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = Filter::all()
            .lt("created_at", cutoff)
            .is_in("level", vec!["debug", "info", "warn"]);

        let count = render_count(&logs, &filter).unwrap();
        assert_eq!(
            count.text,
            "SELECT COUNT(*) AS count FROM \"system_logs\" b \
             WHERE b.\"created_at\" < $1 AND b.\"level\" IN ($2, $3, $4)"
        );

        let delete = render_delete(&logs, &filter).unwrap();
        assert!(delete.text.starts_with("DELETE FROM \"system_logs\" AS b WHERE"));
        assert_eq!(delete.params.len(), 4);
        assert_eq!(delete.params[0], SqlValue::Timestamp(Some(cutoff)));

        let everything = render_delete(&logs, &Filter::all()).unwrap();
        assert_eq!(everything.text, "DELETE FROM \"system_logs\" AS b");
    }

    #[test]
    fn test_null_and_empty_list_conditions() {
        let users = spec(categories::USER);
        let filter = Filter::all()
            .eq("factory_id", FilterValue::Null)
            .ne("role", FilterValue::Null)
            .is_in("status", Vec::<String>::new())
            .not_in("email", Vec::<String>::new());

        let stmt = render_count(&users, &filter).unwrap();
        assert!(stmt.text.ends_with(
            "WHERE b.\"factory_id\" IS NULL AND b.\"role\" IS NOT NULL AND FALSE AND b.\"email\" IS NOT NULL"
        ));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_uuid_and_timestamp_operands_are_parsed() {
        let users = spec(categories::USER);
        let id = Uuid::now_v7();
        let stmt = render_count(&users, &Filter::all().eq("factory_id", id.to_string())).unwrap();
        assert_eq!(stmt.params, vec![SqlValue::Uuid(Some(id))]);

        let bad = render_count(&users, &Filter::all().eq("factory_id", "not-a-uuid"));
        assert!(bad.is_err());

        let stmt = render_count(
            &users,
            &Filter::all().gte("created_at", "2024-03-01T00:00:00Z"),
        )
        .unwrap();
        assert!(matches!(stmt.params[0], SqlValue::Timestamp(Some(_))));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
