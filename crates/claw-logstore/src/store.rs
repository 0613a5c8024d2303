//! SQLite-backed log store with scheduled retention.
//!
//! This module provides:
//! - [`LogStore`] — Open/close, insert, query and retention in one handle
//! - [`StoreStats`] — Snapshot of the store's operation counters
//! - [`shared_store`] — Convenience constructor for an `Arc`-wrapped store

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{GetLogsRequest, GetLogsResponse};
use crate::config::{LoggingConfig, RetentionSettings, StoreConfig};
use crate::connection::ConnectionManager;
use crate::diagnostics::Diagnostics;
use crate::error::{LogStoreError, Result};
use crate::insert;
use crate::query;
use crate::retention::{PurgeTarget, RetentionReaper, cutoff_for};
use crate::types::{LogId, LogPage, LogQuery, NewLogEntry};

/// Snapshot of a store's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Entries written
    pub inserts: u64,
    /// Entries rejected by validation
    pub rejected_inserts: u64,
    /// Queries executed
    pub queries: u64,
    /// Purge cycles completed, scheduled or explicit
    pub purge_cycles: u64,
    /// Rows removed by purges
    pub rows_purged: u64,
}

#[derive(Debug, Default)]
struct Counters {
    inserts: AtomicU64,
    rejected_inserts: AtomicU64,
    queries: AtomicU64,
}

/// A log store backed by a single SQLite connection.
///
/// All calls are safe from any thread; reads, writes and purges are
/// serialized on the one connection. Dropping the store closes it.
pub struct LogStore {
    connection: Arc<ConnectionManager>,
    reaper: RetentionReaper,
    counters: Counters,
    // Held by close and by schedule changes so neither interleaves.
    lifecycle: Mutex<()>,
    diagnostics: Diagnostics,
}

impl LogStore {
    /// Opens (or creates) a store at `path`, logging to the caller's
    /// current dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(&StoreConfig::new(path), Diagnostics::current())
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Connection`] if the store cannot be opened.
    pub fn in_memory() -> Result<Self> {
        Self::open_with(&StoreConfig::in_memory(), Diagnostics::current())
    }

    /// Opens a store with explicit configuration and logging.
    ///
    /// The retention reaper starts stopped; see
    /// [`set_retention`](Self::set_retention).
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Connection`] if the store cannot be opened.
    pub fn open_with(config: &StoreConfig, diagnostics: Diagnostics) -> Result<Self> {
        let connection = Arc::new(ConnectionManager::open(config, diagnostics.clone())?);
        let reaper = RetentionReaper::new(
            Arc::clone(&connection) as Arc<dyn PurgeTarget>,
            diagnostics.clone(),
        );
        Ok(Self {
            connection,
            reaper,
            counters: Counters::default(),
            lifecycle: Mutex::new(()),
            diagnostics,
        })
    }

    /// Stops the reaper, then closes the connection. Idempotent.
    pub fn close(&self) {
        let _guard = self.lifecycle.lock();
        self.reaper.stop();
        self.connection.close();
    }

    /// Returns true until [`close`](Self::close).
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Stores one entry and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Validation`] for an empty publisher or
    /// message or a non-positive timestamp, [`LogStoreError::Closed`] after
    /// close, and [`LogStoreError::Storage`] otherwise.
    pub fn insert(&self, entry: &NewLogEntry) -> Result<LogId> {
        let result = self
            .connection
            .with_conn(|conn| insert::insert(conn, entry));
        self.record_write(&result, 1);
        result
    }

    /// Stores several entries atomically; either all are stored or none.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert), for the first failing entry.
    pub fn insert_batch(&self, entries: &[NewLogEntry]) -> Result<Vec<LogId>> {
        let result = self
            .connection
            .with_conn(|conn| insert::insert_batch(conn, entries));
        self.record_write(&result, entries.len() as u64);
        result
    }

    fn record_write<T>(&self, result: &Result<T>, entries: u64) {
        match result {
            Ok(_) => {
                self.counters.inserts.fetch_add(entries, Ordering::Relaxed);
            }
            Err(e @ LogStoreError::Validation(_)) => {
                self.counters
                    .rejected_inserts
                    .fetch_add(entries, Ordering::Relaxed);
                self.diagnostics
                    .in_scope(|| warn!(entries, error = %e, "log entries rejected"));
            }
            Err(_) => {}
        }
    }

    /// Reads one page of entries.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Closed`] after close and
    /// [`LogStoreError::Storage`] if the read fails.
    pub fn query(&self, request: &LogQuery) -> Result<LogPage> {
        self.connection.with_conn(|conn| {
            self.counters.queries.fetch_add(1, Ordering::Relaxed);
            query::read(conn, request)
        })
    }

    /// Serves a gateway get-logs request.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidField`] for an unknown order-by name,
    /// without reading; otherwise as [`query`](Self::query).
    pub fn get_logs(&self, request: GetLogsRequest) -> Result<GetLogsResponse> {
        let request = LogQuery::try_from(request)?;
        self.query(&request).map(GetLogsResponse::from)
    }

    /// Returns the engine's plan for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Closed`] after close and
    /// [`LogStoreError::Storage`] on failure.
    pub fn explain(&self, request: &LogQuery) -> Result<Vec<String>> {
        self.connection.with_conn(|conn| query::explain(conn, request))
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Closed`] after close and
    /// [`LogStoreError::Storage`] on failure.
    pub fn count(&self) -> Result<u64> {
        self.connection.with_conn(query::count)
    }

    /// Deletes every entry with `timestamp <= cutoff` now.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Closed`] after close and
    /// [`LogStoreError::Storage`] on failure.
    pub fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let rows = self.reaper.purge_now(cutoff)?;
        self.diagnostics
            .in_scope(|| info!(rows, cutoff, "purged log entries on request"));
        Ok(rows)
    }

    /// Deletes every entry older than `ttl` now.
    ///
    /// # Errors
    ///
    /// Same as [`purge_older_than`](Self::purge_older_than).
    pub fn purge_expired(&self, ttl: Duration) -> Result<u64> {
        self.purge_older_than(cutoff_for(ttl))
    }

    /// Starts or replaces the retention schedule.
    ///
    /// Returns once any previous schedule has fully stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] for a zero frequency and
    /// [`LogStoreError::Closed`] after close.
    pub fn set_retention(&self, frequency: Duration, ttl: Duration) -> Result<()> {
        self.apply_settings(RetentionSettings::new(frequency, ttl))
    }

    /// Parses the collaborator's logging configuration and applies its
    /// retention schedule.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] for malformed durations,
    /// otherwise as [`set_retention`](Self::set_retention).
    pub fn apply_config(&self, config: &LoggingConfig) -> Result<RetentionSettings> {
        let settings = config.retention()?;
        self.apply_settings(settings)?;
        Ok(settings)
    }

    fn apply_settings(&self, settings: RetentionSettings) -> Result<()> {
        let _guard = self.lifecycle.lock();
        if !self.connection.is_open() {
            return Err(LogStoreError::Closed);
        }
        self.reaper.reconfigure(settings)
    }

    /// Stops the retention schedule, leaving the store open.
    pub fn stop_retention(&self) {
        let _guard = self.lifecycle.lock();
        self.reaper.stop();
    }

    /// The active retention schedule, if any.
    pub fn retention(&self) -> Option<RetentionSettings> {
        self.reaper.settings()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        let purges = self.reaper.stats();
        StoreStats {
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            rejected_inserts: self.counters.rejected_inserts.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
            purge_cycles: purges.cycles(),
            rows_purged: purges.rows(),
        }
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("connection", &self.connection)
            .field("retention", &self.retention())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A thread-safe, shared log store.
pub type SharedLogStore = Arc<LogStore>;

/// Opens a shared store with explicit configuration and logging.
///
/// # Errors
///
/// Returns [`LogStoreError::Connection`] if the store cannot be opened.
pub fn shared_store(config: &StoreConfig, diagnostics: Diagnostics) -> Result<SharedLogStore> {
    LogStore::open_with(config, diagnostics).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::capture::capturing;
    use crate::types::LogLevel;

    fn store() -> LogStore {
        LogStore::open_with(&StoreConfig::in_memory(), Diagnostics::silent()).expect("open")
    }

    #[test]
    fn counters_track_inserts_and_rejections() {
        let store = store();
        store
            .insert(&NewLogEntry::new("p", "info", "m", 1))
            .expect("insert");
        let _ = store.insert(&NewLogEntry::new("", "info", "m", 1));
        let _ = store.insert_batch(&[
            NewLogEntry::new("p", "info", "a", 1),
            NewLogEntry::new("p", "info", "", 1),
        ]);

        let stats = store.stats();
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.rejected_inserts, 3);
    }

    #[test]
    fn invalid_order_by_issues_no_read() {
        let store = store();
        let request = GetLogsRequest {
            order_by: vec!["severity".into()],
            ..Default::default()
        };

        let result = store.get_logs(request);

        assert!(matches!(result, Err(LogStoreError::InvalidField(_))));
        assert_eq!(store.stats().queries, 0);
    }

    #[test]
    fn get_logs_maps_response() {
        let store = store();
        store
            .insert(&NewLogEntry::new("svc", "error", "boom", 5))
            .expect("insert");

        let response = store.get_logs(GetLogsRequest::default()).expect("get logs");

        assert_eq!(response.size, 1);
        assert_eq!(response.page_num, 1);
        assert_eq!(response.page_size, 20);
        assert_eq!(response.logs[0].level, LogLevel::Error.as_str());
        assert_eq!(store.stats().queries, 1);
    }

    #[test]
    fn close_stops_reaper_then_connection() {
        let (diagnostics, logs) = capturing();
        let store = LogStore::open_with(&StoreConfig::in_memory(), diagnostics).expect("open");
        store
            .set_retention(Duration::from_secs(3600), Duration::from_secs(60))
            .expect("retention");

        store.close();
        store.close();

        assert!(!store.is_open());
        assert_eq!(store.retention(), None);
        let output = logs.contents();
        let reaper_stopped = output.find("retention reaper stopped").expect("reaper log");
        let store_closed = output.find("log store closed").expect("close log");
        assert!(reaper_stopped < store_closed);
    }

    #[test]
    fn operations_after_close_fail_with_closed() {
        let store = store();
        store.close();

        let entry = NewLogEntry::new("p", "info", "m", 1);
        assert!(matches!(store.insert(&entry), Err(LogStoreError::Closed)));
        assert!(matches!(store.query(&LogQuery::new()), Err(LogStoreError::Closed)));
        assert!(matches!(store.purge_older_than(1), Err(LogStoreError::Closed)));
        assert!(matches!(
            store.set_retention(Duration::from_secs(1), Duration::from_secs(1)),
            Err(LogStoreError::Closed)
        ));
        assert_eq!(store.stats().queries, 0);
    }

    #[test]
    fn explicit_purge_is_counted() {
        let store = store();
        for ts in [10, 20, 30] {
            store
                .insert(&NewLogEntry::new("p", "info", "m", ts))
                .expect("insert");
        }

        assert_eq!(store.purge_older_than(20).expect("purge"), 2);
        assert_eq!(store.count().expect("count"), 1);

        let stats = store.stats();
        assert_eq!(stats.purge_cycles, 1);
        assert_eq!(stats.rows_purged, 2);
    }

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogStore>();
        assert_send_sync::<SharedLogStore>();
    }
}
