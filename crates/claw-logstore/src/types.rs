//! Core types for the log store.
//!
//! This module provides:
//! - [`LogLevel`] — Severity levels with their stored integer values
//! - [`LogEntry`] — A stored log record
//! - [`NewLogEntry`] — Caller input for an insert
//! - [`LogQuery`] — Filter, sort and page request
//! - [`LogPage`] — One page of query results
//! - [`SortField`] / [`SortDirection`] — Allowed ordering
//! - [`TimeRange`] — Inclusive time bounds in epoch milliseconds

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogStoreError;

/// Default number of entries per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Surrogate identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId(pub i64);

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log severity levels, stored as their integer value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum LogLevel {
    /// No level given, or an unrecognized one
    #[default]
    NotSet = 0,
    /// Debugging information
    Debug = 10,
    /// General information
    Info = 20,
    /// Warning conditions
    Warning = 30,
    /// Error conditions
    Error = 40,
    /// Critical or fatal conditions
    Critical = 50,
}

impl LogLevel {
    /// All levels, least severe first.
    pub const ALL: [Self; 6] = [
        Self::NotSet,
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    /// Maps a level name to a level, ignoring case.
    ///
    /// `FATAL` and `WARN` are aliases. The name must match exactly apart
    /// from case; empty, padded or unknown names map to [`LogLevel::NotSet`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "CRITICAL" | "FATAL" => Self::Critical,
            "ERROR" => Self::Error,
            "WARNING" | "WARN" => Self::Warning,
            "INFO" => Self::Info,
            "DEBUG" => Self::Debug,
            _ => Self::NotSet,
        }
    }

    /// Maps a stored integer back to a level.
    ///
    /// Values between two levels map to the lower one; negative values map
    /// to [`LogLevel::NotSet`].
    #[must_use]
    pub fn from_severity(value: i64) -> Self {
        Self::ALL
            .iter()
            .rev()
            .find(|level| i64::from(level.severity()) <= value)
            .copied()
            .unwrap_or(Self::NotSet)
    }

    /// Returns the stored integer value.
    #[must_use]
    pub const fn severity(&self) -> i32 {
        *self as i32
    }

    /// Returns the canonical uppercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotSet => "NOTSET",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<String> for LogLevel {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

/// A stored log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Identifier assigned on insert
    pub id: LogId,
    /// Originator of the log
    pub publisher: String,
    /// Severity level
    pub level: LogLevel,
    /// The log message
    pub message: String,
    /// Event time in milliseconds since the epoch
    pub timestamp: i64,
}

/// A log record as submitted by a publisher, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    /// Originator of the log
    pub publisher: String,
    /// Raw level name, normalized on insert
    pub level: String,
    /// The log message
    pub message: String,
    /// Event time in milliseconds since the epoch
    pub timestamp: i64,
}

impl NewLogEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(
        publisher: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            publisher: publisher.into(),
            level: level.into(),
            message: message.into(),
            timestamp,
        }
    }

    /// Returns the normalized level.
    #[must_use]
    pub fn normalized_level(&self) -> LogLevel {
        LogLevel::from_name(&self.level)
    }
}

/// Inclusive time range in epoch milliseconds. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Lower bound (inclusive)
    pub start: Option<i64>,
    /// Upper bound (inclusive)
    pub end: Option<i64>,
}

impl TimeRange {
    /// Creates a new time range with the given bounds.
    #[must_use]
    pub const fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Creates a range with only a lower bound.
    #[must_use]
    pub const fn since(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Creates a range with only an upper bound.
    #[must_use]
    pub const fn until(end: i64) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Checks if a timestamp falls within this range.
    #[must_use]
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }
}

/// Columns a query may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Order by publisher
    Publisher,
    /// Order by severity
    Level,
    /// Order by message text
    Message,
    /// Order by event time
    #[default]
    Timestamp,
}

impl SortField {
    /// All sortable fields.
    pub const ALL: [Self; 4] = [Self::Publisher, Self::Level, Self::Message, Self::Timestamp];

    /// Returns the column name.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Level => "level",
            Self::Message => "message",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for SortField {
    type Err = LogStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|field| field.column() == s)
            .copied()
            .ok_or_else(|| LogStoreError::InvalidField(s.to_string()))
    }
}

/// Sort direction, applied to every sort field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

impl SortDirection {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// A filtered, sorted, paginated read request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Time range filter
    #[serde(default)]
    pub time_range: TimeRange,
    /// Publishers to include (empty means all publishers)
    #[serde(default)]
    pub publishers: Vec<String>,
    /// Minimum severity (absent means no threshold)
    pub min_level: Option<LogLevel>,
    /// Substring the message must contain
    pub message: Option<String>,
    /// Sort fields (empty means timestamp)
    #[serde(default)]
    pub order_by: Vec<SortField>,
    /// Direction for every sort field
    #[serde(default)]
    pub direction: SortDirection,
    /// 1-based page number (0 means the first page)
    #[serde(default)]
    pub page: u32,
    /// Entries per page (0 means [`DEFAULT_PAGE_SIZE`])
    #[serde(default)]
    pub page_size: u32,
}

impl LogQuery {
    /// Creates a query that matches every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time range filter.
    #[must_use]
    pub const fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Only entries at or after `start`.
    #[must_use]
    pub const fn since(mut self, start: i64) -> Self {
        self.time_range.start = Some(start);
        self
    }

    /// Only entries at or before `end`.
    #[must_use]
    pub const fn until(mut self, end: i64) -> Self {
        self.time_range.end = Some(end);
        self
    }

    /// Adds a publisher to the publisher filter.
    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publishers.push(publisher.into());
        self
    }

    /// Replaces the publisher filter.
    #[must_use]
    pub fn with_publishers<I, S>(mut self, publishers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.publishers = publishers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Sets the message substring filter.
    #[must_use]
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    /// Appends a sort field.
    #[must_use]
    pub fn order_by(mut self, field: SortField) -> Self {
        self.order_by.push(field);
        self
    }

    /// Sorts descending.
    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }

    /// Sorts ascending.
    #[must_use]
    pub const fn ascending(mut self) -> Self {
        self.direction = SortDirection::Ascending;
        self
    }

    /// Sets the page number.
    #[must_use]
    pub const fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Page number after normalization.
    #[must_use]
    pub const fn effective_page(&self) -> u32 {
        if self.page == 0 { 1 } else { self.page }
    }

    /// Page size after normalization.
    #[must_use]
    pub const fn effective_page_size(&self) -> u32 {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    /// Number of matching rows skipped before the page starts.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_page_size())
    }

    /// Severity threshold; 0 when no level was requested.
    #[must_use]
    pub fn level_threshold(&self) -> i32 {
        self.min_level.map_or(0, |level| level.severity())
    }

    /// Sort fields in order, duplicates removed, defaulting to timestamp.
    #[must_use]
    pub fn effective_order_by(&self) -> Vec<SortField> {
        let mut fields: Vec<SortField> = Vec::with_capacity(self.order_by.len().max(1));
        for field in &self.order_by {
            if !fields.contains(field) {
                fields.push(*field);
            }
        }
        if fields.is_empty() {
            fields.push(SortField::default());
        }
        fields
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    /// Entries on this page
    pub entries: Vec<LogEntry>,
    /// Effective page number
    pub page: u32,
    /// Effective page size
    pub page_size: u32,
    /// Number of entries returned on this page (not the total match count)
    pub size: usize,
    /// Rows skipped before this page
    pub offset: u64,
}
