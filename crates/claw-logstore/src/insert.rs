//! The write path.
//!
//! Entries are written through the insert statement prepared at open and
//! held in the connection's statement cache. The table's CHECK constraints
//! are the validation; a violation comes back as
//! [`LogStoreError::Validation`].

use rusqlite::{Connection, ErrorCode, params};
use tracing::debug;

use crate::error::{LogStoreError, Result};
use crate::schema::INSERT_LOG;
use crate::types::{LogId, NewLogEntry};

/// Normalizes the level and writes one entry, returning its new id.
///
/// # Errors
///
/// Returns [`LogStoreError::Validation`] for an empty publisher or message
/// or a non-positive timestamp, and [`LogStoreError::Storage`] for any
/// other failure.
pub fn insert(conn: &Connection, entry: &NewLogEntry) -> Result<LogId> {
    let level = entry.normalized_level();
    let mut stmt = conn
        .prepare_cached(INSERT_LOG)
        .map_err(LogStoreError::storage)?;

    stmt.execute(params![
        entry.publisher,
        level.severity(),
        entry.message,
        entry.timestamp
    ])
    .map_err(|e| classify_write_error(entry, e))?;

    let id = LogId(conn.last_insert_rowid());
    debug!(%id, publisher = %entry.publisher, %level, "log entry stored");
    Ok(id)
}

/// Writes every entry in one transaction, returning the ids in order.
///
/// Nothing is stored unless every entry is accepted.
///
/// # Errors
///
/// Same as [`insert`], for the first entry that fails.
pub fn insert_batch(conn: &Connection, entries: &[NewLogEntry]) -> Result<Vec<LogId>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| LogStoreError::Storage(format!("begin transaction: {e}")))?;

    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        ids.push(insert(&tx, entry)?);
    }

    tx.commit()
        .map_err(|e| LogStoreError::Storage(format!("commit: {e}")))?;
    Ok(ids)
}

fn classify_write_error(entry: &NewLogEntry, err: rusqlite::Error) -> LogStoreError {
    match err {
        rusqlite::Error::SqliteFailure(code, detail)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            let reason = detail.unwrap_or_else(|| code.to_string());
            LogStoreError::Validation(format!(
                "entry from {:?} at {} rejected: {reason}",
                entry.publisher, entry.timestamp
            ))
        }
        other => LogStoreError::storage(other),
    }
}
