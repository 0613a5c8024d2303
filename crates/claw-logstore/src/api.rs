//! Request and response shapes exchanged with the gateway transport.
//!
//! Field names match the JSON the gateway accepts and returns. Decoding is
//! the transport's job; this module only converts between these shapes and
//! the store's own types.

use serde::{Deserialize, Serialize};

use crate::error::{LogStoreError, Result};
use crate::types::{
    LogEntry, LogLevel, LogPage, LogQuery, NewLogEntry, SortDirection, SortField, TimeRange,
};

/// A log message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Originator of the log
    pub publisher: String,
    /// Event time in milliseconds since the epoch
    pub timestamp: i64,
    /// Level name
    #[serde(default)]
    pub level: String,
    /// The log message
    pub message: String,
}

impl From<LogEntry> for LogMessage {
    fn from(entry: LogEntry) -> Self {
        Self {
            publisher: entry.publisher,
            timestamp: entry.timestamp,
            level: entry.level.as_str().to_string(),
            message: entry.message,
        }
    }
}

/// Body of an add-log call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLogRequest {
    /// The message to store
    #[serde(flatten)]
    pub log: LogMessage,
}

impl From<AddLogRequest> for NewLogEntry {
    fn from(request: AddLogRequest) -> Self {
        Self {
            publisher: request.log.publisher,
            level: request.log.level,
            message: request.log.message,
            timestamp: request.log.timestamp,
        }
    }
}

/// Body of a get-logs call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLogsRequest {
    /// Lower time bound; non-positive values mean no bound
    #[serde(rename = "timeframestart", default)]
    pub time_frame_start: Option<i64>,
    /// Upper time bound; non-positive values mean no bound
    #[serde(rename = "timeframeend", default)]
    pub time_frame_end: Option<i64>,
    /// Publishers to include
    #[serde(default)]
    pub publishers: Vec<String>,
    /// Minimum level name
    #[serde(default)]
    pub level: String,
    /// Message substring
    #[serde(default)]
    pub message: String,
    /// 1-based page number
    #[serde(default)]
    pub page: i64,
    /// Sort field names
    #[serde(rename = "orderby", default)]
    pub order_by: Vec<String>,
    /// Ascending when true or absent
    #[serde(default)]
    pub asc: Option<bool>,
    /// Entries per page
    #[serde(rename = "pagesize", default)]
    pub page_size: i64,
}

impl TryFrom<GetLogsRequest> for LogQuery {
    type Error = LogStoreError;

    fn try_from(request: GetLogsRequest) -> Result<Self> {
        let order_by = request
            .order_by
            .iter()
            .map(|name| name.parse::<SortField>())
            .collect::<Result<Vec<_>>>()?;

        let min_level = match LogLevel::from_name(&request.level) {
            LogLevel::NotSet => None,
            level => Some(level),
        };

        Ok(Self {
            time_range: TimeRange::new(
                request.time_frame_start.filter(|t| *t > 0),
                request.time_frame_end.filter(|t| *t > 0),
            ),
            publishers: request.publishers,
            min_level,
            message: Some(request.message).filter(|m| !m.is_empty()),
            order_by,
            direction: if request.asc.unwrap_or(true) {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            },
            page: clamp_to_u32(request.page),
            page_size: clamp_to_u32(request.page_size),
        })
    }
}

fn clamp_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Body of a get-logs response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLogsResponse {
    /// Entries on the page
    pub logs: Vec<LogMessage>,
    /// Number of entries on the page
    pub size: usize,
    /// Effective page number
    #[serde(rename = "page")]
    pub page_num: u32,
    /// Effective page size
    #[serde(rename = "pagesize")]
    pub page_size: u32,
}

impl From<LogPage> for GetLogsResponse {
    fn from(page: LogPage) -> Self {
        Self {
            logs: page.entries.into_iter().map(LogMessage::from).collect(),
            size: page.size,
            page_num: page.page,
            page_size: page.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogId;
    use test_case::test_case;

    #[test]
    fn add_request_decodes_flat_json() {
        let json = r#"{"publisher":"sensor-1","timestamp":1700000000000,"level":"warn","message":"hot"}"#;
        let request: AddLogRequest = serde_json::from_str(json).expect("decode");
        let entry = NewLogEntry::from(request);

        assert_eq!(entry.publisher, "sensor-1");
        assert_eq!(entry.timestamp, 1_700_000_000_000);
        assert_eq!(entry.normalized_level(), LogLevel::Warning);
        assert_eq!(entry.message, "hot");
    }

    #[test]
    fn add_request_without_level_is_notset() {
        let json = r#"{"publisher":"p","timestamp":1,"message":"m"}"#;
        let request: AddLogRequest = serde_json::from_str(json).expect("decode");
        assert_eq!(NewLogEntry::from(request).normalized_level(), LogLevel::NotSet);
    }

    #[test]
    fn get_request_decodes_gateway_field_names() {
        let json = r#"{
            "timeframestart": 100,
            "timeframeend": 200,
            "publishers": ["a", "b"],
            "level": "info",
            "message": "boot",
            "page": 3,
            "orderby": ["publisher", "timestamp"],
            "asc": false,
            "pagesize": 50
        }"#;
        let request: GetLogsRequest = serde_json::from_str(json).expect("decode");
        let query = LogQuery::try_from(request).expect("convert");

        assert_eq!(query.time_range, TimeRange::new(Some(100), Some(200)));
        assert_eq!(query.publishers, vec!["a", "b"]);
        assert_eq!(query.min_level, Some(LogLevel::Info));
        assert_eq!(query.message.as_deref(), Some("boot"));
        assert_eq!(query.order_by, vec![SortField::Publisher, SortField::Timestamp]);
        assert_eq!(query.direction, SortDirection::Descending);
        assert_eq!(query.page, 3);
        assert_eq!(query.page_size, 50);
    }

    #[test]
    fn empty_get_request_uses_defaults() {
        let request: GetLogsRequest = serde_json::from_str("{}").expect("decode");
        let query = LogQuery::try_from(request).expect("convert");

        assert_eq!(query.time_range, TimeRange::default());
        assert!(query.publishers.is_empty());
        assert_eq!(query.min_level, None);
        assert_eq!(query.message, None);
        assert_eq!(query.direction, SortDirection::Ascending);
        assert_eq!(query.effective_page(), 1);
        assert_eq!(query.effective_page_size(), 20);
        assert_eq!(query.effective_order_by(), vec![SortField::Timestamp]);
    }

    #[test]
    fn unknown_order_by_field_is_rejected() {
        let request = GetLogsRequest {
            order_by: vec!["timestamp".into(), "id".into()],
            ..Default::default()
        };
        let result = LogQuery::try_from(request);
        assert!(matches!(result, Err(LogStoreError::InvalidField(ref f)) if f == "id"));
    }

    #[test_case(-4, 0 ; "negative clamps to zero")]
    #[test_case(0, 0 ; "zero stays zero")]
    #[test_case(12, 12 ; "positive passes through")]
    #[test_case(i64::MAX, u32::MAX ; "huge saturates")]
    fn page_numbers_are_clamped(raw: i64, expected: u32) {
        assert_eq!(clamp_to_u32(raw), expected);
    }

    #[test]
    fn non_positive_time_bounds_are_open() {
        let request = GetLogsRequest {
            time_frame_start: Some(0),
            time_frame_end: Some(-1),
            ..Default::default()
        };
        let query = LogQuery::try_from(request).expect("convert");
        assert_eq!(query.time_range, TimeRange::default());
    }

    #[test]
    fn unknown_level_name_applies_no_threshold() {
        let request = GetLogsRequest {
            level: "loud".into(),
            ..Default::default()
        };
        let query = LogQuery::try_from(request).expect("convert");
        assert_eq!(query.level_threshold(), 0);
    }

    #[test]
    fn response_uses_canonical_level_names() {
        let page = LogPage {
            entries: vec![LogEntry {
                id: LogId(9),
                publisher: "p".into(),
                level: LogLevel::Error,
                message: "m".into(),
                timestamp: 5,
            }],
            page: 2,
            page_size: 10,
            size: 1,
            offset: 10,
        };
        let response = GetLogsResponse::from(page);
        let json = serde_json::to_value(&response).expect("encode");

        assert_eq!(json["logs"][0]["level"], "ERROR");
        assert_eq!(json["size"], 1);
        assert_eq!(json["page"], 2);
        assert_eq!(json["pagesize"], 10);
    }
}
