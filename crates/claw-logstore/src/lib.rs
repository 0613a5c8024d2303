//! # claw-logstore
//!
//! Embeddable log retention store backed by SQLite.
//!
//! This crate provides:
//!
//! - [`LogStore`] — Open/close, insert, query and scheduled retention
//! - [`NewLogEntry`] / [`LogEntry`] — Entries before and after storage
//! - [`LogLevel`] — Severity levels (NotSet, Debug, Info, Warning, Error, Critical)
//! - [`LogQuery`] / [`LogPage`] — Filtered, sorted, paginated reads
//! - [`RetentionReaper`] / [`PeriodicTask`] — Background purge of aged entries
//! - [`GetLogsRequest`] / [`GetLogsResponse`] — Gateway request shapes
//! - [`Diagnostics`] — Injected `tracing` dispatcher for every component
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use claw_logstore::{LogLevel, LogQuery, LogStore, NewLogEntry};
//!
//! let store = LogStore::in_memory()?;
//! store.insert(&NewLogEntry::new("sensor-1", "warn", "temperature high", 1_700_000_000_000))?;
//!
//! let page = store.query(&LogQuery::new().with_min_level(LogLevel::Info))?;
//! assert_eq!(page.entries[0].level, LogLevel::Warning);
//!
//! store.set_retention(Duration::from_secs(48 * 3600), Duration::from_secs(240 * 3600))?;
//! store.close();
//! # Ok::<(), claw_logstore::LogStoreError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod insert;
pub mod query;
pub mod retention;
pub mod schema;
pub mod store;
pub mod types;

// Re-export main types
pub use api::{AddLogRequest, GetLogsRequest, GetLogsResponse, LogMessage};
pub use config::{
    LoggingConfig, RetentionSettings, StorageLocation, StoreConfig, parse_duration,
};
pub use connection::ConnectionManager;
pub use diagnostics::Diagnostics;
pub use error::{LogStoreError, Result};
pub use query::BuiltQuery;
pub use retention::{PeriodicTask, PurgeStats, PurgeTarget, RetentionReaper};
pub use store::{LogStore, SharedLogStore, StoreStats, shared_store};
pub use types::{
    DEFAULT_PAGE_SIZE, LogEntry, LogId, LogLevel, LogPage, LogQuery, NewLogEntry, SortDirection,
    SortField, TimeRange,
};
