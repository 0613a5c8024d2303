//! Table, index and engine tuning definitions.
//!
//! The schema is created on open and never altered at runtime. Both
//! indexes carry all four queryable columns (and the rowid implicitly), so
//! time-ordered and publisher-scoped reads are answered from the index
//! alone.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{LogStoreError, Result};

/// Name of the log table.
pub const TABLE_NAME: &str = "logs";

/// Columns selected by every read, in row order.
pub const SELECT_COLUMNS: &str = "id, publisher, message, level, timestamp";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    publisher  TEXT NOT NULL CHECK(publisher <> ''),
    message    TEXT NOT NULL CHECK(message <> ''),
    level      INTEGER NOT NULL,
    timestamp  INTEGER NOT NULL CHECK(timestamp > 0)
)";

/// Column order of each covering index.
pub const COVERING_INDEXES: [[&str; 4]; 2] = [
    ["timestamp", "publisher", "level", "message"],
    ["publisher", "timestamp", "level", "message"],
];

/// Insert statement, prepared once and reused from the statement cache.
pub const INSERT_LOG: &str =
    "INSERT INTO logs (publisher, level, message, timestamp) VALUES (?1, ?2, ?3, ?4)";

/// Retention delete; the cutoff is always bound.
pub const DELETE_EXPIRED: &str = "DELETE FROM logs WHERE timestamp <= ?1";

/// Engine tuning directives, applied best-effort after the schema exists.
pub const TUNING_DIRECTIVES: [(&str, &str); 4] = [
    ("journal_mode", "WAL"),
    ("synchronous", "OFF"),
    ("temp_store", "MEMORY"),
    ("locking_mode", "EXCLUSIVE"),
];

/// Name of the index with the given column order.
#[must_use]
pub fn index_name(columns: &[&str; 4]) -> String {
    format!("indx_{}", columns.join("_"))
}

fn create_index_sql(columns: &[&str; 4]) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {TABLE_NAME} ({})",
        index_name(columns),
        columns.join(", ")
    )
}

/// Creates the log table and both covering indexes if they are missing.
///
/// Safe to call on an existing store.
///
/// # Errors
///
/// Returns [`LogStoreError::Connection`] if any statement fails.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE)
        .map_err(|e| LogStoreError::connection("create logs table", e))?;

    for columns in &COVERING_INDEXES {
        conn.execute_batch(&create_index_sql(columns))
            .map_err(|e| LogStoreError::connection("create covering index", e))?;
        debug!(index = %index_name(columns), "covering index ready");
    }

    Ok(())
}

/// Applies the tuning directives, logging each one that fails.
///
/// Returns the number of directives that were applied. A failure leaves
/// the store correct but slower or less concurrent.
pub fn apply_tuning(conn: &Connection) -> usize {
    let mut applied = 0;
    for (pragma, value) in TUNING_DIRECTIVES {
        match conn.pragma_update(None, pragma, value) {
            Ok(()) => {
                applied += 1;
                debug!(pragma, value, "tuning directive applied");
            }
            Err(e) => {
                warn!(pragma, value, error = %e, "tuning directive failed, running degraded");
            }
        }
    }
    applied
}
