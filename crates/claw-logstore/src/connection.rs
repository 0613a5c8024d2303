//! Ownership of the single database connection.
//!
//! Every read, write and purge goes through [`ConnectionManager::with_conn`],
//! which holds the connection lock for the duration of the call. Access is
//! therefore serialized through one execution path, and the shared insert
//! statement in the connection's cache is never used by two callers at once.

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::config::{StorageLocation, StoreConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{LogStoreError, Result};
use crate::schema;

/// Capacity of the prepared statement cache.
///
/// Only the insert and the purge are cached; reads are prepared per call.
const STATEMENT_CACHE_CAPACITY: usize = 32;

/// Owns the one live connection to the log database.
pub struct ConnectionManager {
    conn: Mutex<Option<Connection>>,
    location: StorageLocation,
    diagnostics: Diagnostics,
}

impl ConnectionManager {
    /// Opens the database, creates the schema and prepares the insert.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Connection`] if the database cannot be
    /// opened, the schema cannot be created, or the insert statement
    /// cannot be prepared.
    pub fn open(config: &StoreConfig, diagnostics: Diagnostics) -> Result<Self> {
        let conn = diagnostics.in_scope(|| open_connection(config))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            location: config.location.clone(),
            diagnostics,
        })
    }

    /// Runs `f` against the connection.
    ///
    /// Blocks while another call holds the connection. Events emitted by
    /// `f` go to this manager's [`Diagnostics`].
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Closed`] after [`close`](Self::close), or
    /// whatever `f` returns.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.diagnostics.in_scope(|| {
            let guard = self.conn.lock();
            let conn = guard.as_ref().ok_or(LogStoreError::Closed)?;
            f(conn)
        })
    }

    /// Returns true until the connection has been closed.
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Where the database lives.
    pub const fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// The logging capability this manager was opened with.
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Releases the cached statements and closes the connection.
    ///
    /// Waits for any in-flight call to finish. Calling it again is a no-op.
    /// Failures are logged, never returned; the handle is gone either way.
    pub fn close(&self) {
        let Some(conn) = self.conn.lock().take() else {
            return;
        };

        self.diagnostics.in_scope(|| {
            conn.flush_prepared_statement_cache();
            debug!("prepared statements released");

            match conn.close() {
                Ok(()) => info!(location = ?self.location, "log store closed"),
                Err((conn, e)) => {
                    error!(location = ?self.location, error = %e, "failed to close log store");
                    drop(conn);
                }
            }
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn open_connection(config: &StoreConfig) -> Result<Connection> {
    let conn = match &config.location {
        StorageLocation::File(path) => Connection::open(path),
        StorageLocation::InMemory => Connection::open_in_memory(),
    }
    .map_err(|e| LogStoreError::connection("open database", e))?;

    schema::create_schema(&conn)?;

    if config.tuning {
        let applied = schema::apply_tuning(&conn);
        debug!(
            applied,
            total = schema::TUNING_DIRECTIVES.len(),
            "tuning directives processed"
        );
    }

    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    conn.prepare_cached(schema::INSERT_LOG)
        .map_err(|e| LogStoreError::connection("prepare insert statement", e))?;

    info!(location = ?config.location, "log store opened");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::capture::capturing;
    use crate::types::{LogQuery, NewLogEntry};
    use crate::{insert, query};
    use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row_count(manager: &ConnectionManager) -> i64 {
        manager
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
                    .map_err(LogStoreError::storage)
            })
            .expect("count")
    }

    #[test]
    fn open_in_memory_creates_schema() {
        let manager = ConnectionManager::open(&StoreConfig::in_memory(), Diagnostics::silent())
            .expect("open");
        assert!(manager.is_open());
        assert_eq!(row_count(&manager), 0);
    }

    #[test]
    fn open_creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs.db");
        assert!(!path.exists());

        let manager =
            ConnectionManager::open(&StoreConfig::new(&path), Diagnostics::silent()).expect("open");
        assert!(path.exists());
        assert_eq!(manager.location(), &StorageLocation::File(path.clone()));
    }

    #[test]
    fn open_unreachable_path_is_connection_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("no").join("such").join("dir").join("logs.db");

        let result = ConnectionManager::open(&StoreConfig::new(path), Diagnostics::silent());
        assert!(matches!(result, Err(LogStoreError::Connection(_))));
    }

    #[test]
    fn reopen_existing_store_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StoreConfig::new(dir.path().join("logs.db"));

        let first = ConnectionManager::open(&config, Diagnostics::silent()).expect("first open");
        first
            .with_conn(|conn| {
                conn.execute(schema::INSERT_LOG, rusqlite::params!["p", 20, "m", 1])
                    .map_err(LogStoreError::storage)
            })
            .expect("insert");
        first.close();

        let second = ConnectionManager::open(&config, Diagnostics::silent()).expect("second open");
        assert_eq!(row_count(&second), 1);
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_use() {
        let manager = ConnectionManager::open(&StoreConfig::in_memory(), Diagnostics::silent())
            .expect("open");

        manager.close();
        manager.close();

        assert!(!manager.is_open());
        let result = manager.with_conn(|_| Ok(()));
        assert!(matches!(result, Err(LogStoreError::Closed)));
    }

    #[test]
    fn lifecycle_is_logged_to_injected_diagnostics() {
        let (diagnostics, logs) = capturing();
        let manager =
            ConnectionManager::open(&StoreConfig::in_memory(), diagnostics).expect("open");
        manager.close();

        let output = logs.contents();
        assert!(output.contains("covering index ready"));
        assert!(output.contains("log store opened"));
        assert!(output.contains("prepared statements released"));
        assert!(output.contains("log store closed"));
    }

    #[test]
    fn insert_stays_prepared_across_many_query_shapes() {
        let manager = ConnectionManager::open(&StoreConfig::in_memory(), Diagnostics::silent())
            .expect("open");

        // The authorizer runs only while a statement is compiled.
        let insert_compiles = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&insert_compiles);
        manager
            .with_conn(|conn| {
                conn.authorizer(Some(move |ctx: AuthContext<'_>| {
                    if matches!(ctx.action, AuthAction::Insert { .. }) {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Authorization::Allow
                }));
                Ok(())
            })
            .expect("install authorizer");

        let entry = NewLogEntry::new("p0", "info", "m", 1);
        manager
            .with_conn(|conn| insert::insert(conn, &entry))
            .expect("first insert");
        let after_first = insert_compiles.load(Ordering::SeqCst);

        for size in 1..=40 {
            let publishers: Vec<String> = (0..size).map(|i| format!("p{i}")).collect();
            let page = manager
                .with_conn(|conn| query::read(conn, &LogQuery::new().with_publishers(publishers)))
                .expect("read");
            assert!(page.size >= 1);
        }

        manager
            .with_conn(|conn| insert::insert(conn, &entry))
            .expect("second insert");
        assert_eq!(insert_compiles.load(Ordering::SeqCst), after_first);

        manager
            .with_conn(|conn| {
                conn.prepare(schema::INSERT_LOG)
                    .map(drop)
                    .map_err(LogStoreError::storage)
            })
            .expect("fresh prepare");
        assert_eq!(insert_compiles.load(Ordering::SeqCst), after_first + 1);
    }

    #[test]
    fn manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionManager>();
    }
}
