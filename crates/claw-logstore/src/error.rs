//! Error types for the log store.

use thiserror::Error;

/// Errors that can occur in the log store.
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// The store could not be opened, the schema could not be created, or
    /// the insert statement could not be prepared.
    #[error("connection error: {0}")]
    Connection(String),

    /// A write violated a storage invariant (empty publisher or message,
    /// non-positive timestamp).
    #[error("validation error: {0}")]
    Validation(String),

    /// A query requested a sort field outside the allowed set.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// Any other read or write execution failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A retention setting or duration string was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The store has been closed.
    #[error("log store is closed")]
    Closed,
}

impl LogStoreError {
    /// Returns true if the failure is scoped to a single call.
    ///
    /// Only connection errors are fatal; they abort startup.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Connection(_))
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub(crate) fn connection(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Connection(format!("{context}: {err}"))
    }
}

/// Result type alias for log store operations.
pub type Result<T> = std::result::Result<T, LogStoreError>;
