//! Filtered, sorted, paginated reads.
//!
//! [`build`] turns a [`LogQuery`] into SQL text plus a list of bound
//! values. Filter values only ever travel as bound parameters; the SQL text
//! is assembled from fixed fragments and the allow-listed sort columns.

use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use tracing::debug;

use crate::error::{LogStoreError, Result};
use crate::schema::{SELECT_COLUMNS, TABLE_NAME};
use crate::types::{LogEntry, LogId, LogLevel, LogPage, LogQuery};

const LIKE_ESCAPE: char = '\\';

/// SQL text with its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    /// Statement text with `?` placeholders
    pub sql: String,
    /// Values for the placeholders
    pub params: Vec<Value>,
}

#[derive(Default)]
struct PredicateBuilder {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl PredicateBuilder {
    fn push(&mut self, clause: impl Into<String>, value: Value) {
        self.clauses.push(clause.into());
        self.params.push(value);
    }

    fn push_in(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({placeholders})"));
        self.params.extend(values.iter().cloned().map(Value::Text));
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Builds the read for `query`.
#[must_use]
pub fn build(query: &LogQuery) -> BuiltQuery {
    let mut predicates = PredicateBuilder::default();

    if let Some(start) = query.time_range.start {
        predicates.push("timestamp >= ?", Value::Integer(start));
    }
    if let Some(end) = query.time_range.end {
        predicates.push("timestamp <= ?", Value::Integer(end));
    }
    predicates.push_in("publisher", &query.publishers);

    let threshold = query.level_threshold();
    if threshold > 0 {
        predicates.push("level >= ?", Value::Integer(i64::from(threshold)));
    }
    if let Some(text) = query.message.as_deref().filter(|m| !m.is_empty()) {
        predicates.push(
            format!("message LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
            Value::Text(format!("%{}%", escape_like(text))),
        );
    }

    let direction = query.direction.keyword();
    let order_by = query
        .effective_order_by()
        .iter()
        .map(|field| format!("{} {direction}", field.column()))
        .chain(std::iter::once(format!("id {direction}")))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM {TABLE_NAME}{} ORDER BY {order_by} LIMIT ? OFFSET ?",
        predicates.where_clause()
    );

    let mut params = predicates.params;
    params.push(Value::Integer(i64::from(query.effective_page_size())));
    params.push(Value::Integer(
        i64::try_from(query.offset()).unwrap_or(i64::MAX),
    ));

    BuiltQuery { sql, params }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: LogId(row.get(0)?),
        publisher: row.get(1)?,
        message: row.get(2)?,
        level: LogLevel::from_severity(row.get(3)?),
        timestamp: row.get(4)?,
    })
}

/// Runs `query` and materializes one page.
///
/// # Errors
///
/// Returns [`LogStoreError::Storage`] if the statement fails or any row
/// cannot be read; no partial page is returned.
pub fn read(conn: &Connection, query: &LogQuery) -> Result<LogPage> {
    let built = build(query);
    let mut stmt = conn.prepare(&built.sql).map_err(LogStoreError::storage)?;

    let entries = stmt
        .query_map(params_from_iter(built.params.iter()), entry_from_row)
        .map_err(LogStoreError::storage)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(LogStoreError::storage)?;

    let page = LogPage {
        size: entries.len(),
        entries,
        page: query.effective_page(),
        page_size: query.effective_page_size(),
        offset: query.offset(),
    };
    debug!(
        page = page.page,
        page_size = page.page_size,
        returned = page.size,
        "log query served"
    );
    Ok(page)
}

/// Returns the engine's plan for `query`, one detail line per step.
///
/// # Errors
///
/// Returns [`LogStoreError::Storage`] if the plan cannot be produced.
pub fn explain(conn: &Connection, query: &LogQuery) -> Result<Vec<String>> {
    let built = build(query);
    let mut stmt = conn
        .prepare(&format!("EXPLAIN QUERY PLAN {}", built.sql))
        .map_err(LogStoreError::storage)?;

    stmt.query_map(params_from_iter(built.params.iter()), |row| {
        row.get::<_, String>(3)
    })
    .map_err(LogStoreError::storage)?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(LogStoreError::storage)
}

/// Total number of stored entries.
///
/// # Errors
///
/// Returns [`LogStoreError::Storage`] on failure.
pub fn count(conn: &Connection) -> Result<u64> {
    let rows: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), [], |row| {
            row.get(0)
        })
        .map_err(LogStoreError::storage)?;
    Ok(u64::try_from(rows).unwrap_or_default())
}
