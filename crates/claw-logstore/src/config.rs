//! Store and retention configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LogStoreError, Result};

/// Default location of the log database.
pub const DEFAULT_DB_PATH: &str = "/log/iofog.logs.db";

/// Default interval between retention purges.
pub const DEFAULT_CLEAN_FREQUENCY: Duration = Duration::from_secs(48 * 60 * 60);

/// Default age after which entries are purged.
pub const DEFAULT_TTL: Duration = Duration::from_secs(240 * 60 * 60);

// A whole duration string: one or more number+unit groups, or a bare zero.
static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0|(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|ms|s|m|h))+)$")
        .unwrap_or_else(|_| unreachable!())
});

static DURATION_PART_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)").unwrap_or_else(|_| unreachable!())
});

/// Where the store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// A database file, created if missing
    File(PathBuf),
    /// A private in-memory database, lost on close
    InMemory,
}

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Storage location
    pub location: StorageLocation,
    /// Whether to apply the engine tuning directives after open
    pub tuning: bool,
}

impl StoreConfig {
    /// A file-backed store at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: StorageLocation::File(path.as_ref().to_path_buf()),
            tuning: true,
        }
    }

    /// An in-memory store.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            location: StorageLocation::InMemory,
            tuning: true,
        }
    }

    /// Enables or disables the tuning directives.
    #[must_use]
    pub const fn with_tuning(mut self, tuning: bool) -> Self {
        self.tuning = tuning;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

/// Reaper schedule: how often to purge and how old an entry must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Interval between purges
    pub frequency: Duration,
    /// Entries older than this are purged
    pub ttl: Duration,
}

impl RetentionSettings {
    /// Creates settings from the two durations.
    #[must_use]
    pub const fn new(frequency: Duration, ttl: Duration) -> Self {
        Self { frequency, ttl }
    }

    /// Checks that the settings can drive a reaper.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] for a zero frequency.
    pub fn validate(&self) -> Result<()> {
        if self.frequency.is_zero() {
            return Err(LogStoreError::InvalidConfig(
                "clean frequency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAN_FREQUENCY, DEFAULT_TTL)
    }
}

/// Logging configuration as delivered by the configuration collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tokens accepted by the gateway; carried, not enforced here
    #[serde(default)]
    pub access_tokens: Vec<String>,
    /// Purge interval as a duration string, e.g. `"48h"`
    #[serde(rename = "cleanfrequency", default)]
    pub clean_frequency: String,
    /// Entry lifetime as a duration string, e.g. `"240h"`
    #[serde(default)]
    pub ttl: String,
}

impl LoggingConfig {
    /// Parses the two duration strings into retention settings.
    ///
    /// Empty strings take the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] if either string is
    /// malformed or the frequency is zero.
    pub fn retention(&self) -> Result<RetentionSettings> {
        let frequency = parse_or_default(&self.clean_frequency, DEFAULT_CLEAN_FREQUENCY)?;
        let ttl = parse_or_default(&self.ttl, DEFAULT_TTL)?;
        let settings = RetentionSettings::new(frequency, ttl);
        settings.validate()?;
        Ok(settings)
    }
}

fn parse_or_default(input: &str, default: Duration) -> Result<Duration> {
    if input.trim().is_empty() {
        Ok(default)
    } else {
        parse_duration(input)
    }
}

/// Parses a duration string such as `"48h"`, `"1h30m"` or `"1.5s"`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. Groups add up.
///
/// # Errors
///
/// Returns [`LogStoreError::InvalidConfig`] if the string is malformed or
/// the total does not fit in a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if !DURATION_REGEX.is_match(input) {
        return Err(LogStoreError::InvalidConfig(format!("invalid duration: {input:?}")));
    }

    let mut nanos = 0f64;
    for caps in DURATION_PART_REGEX.captures_iter(input) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| LogStoreError::InvalidConfig(format!("invalid duration: {input:?}")))?;
        nanos += value * unit_nanos(&caps[2]);
    }

    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(LogStoreError::InvalidConfig(format!("duration out of range: {input:?}")));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        _ => 3600e9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    mod duration_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("48h", Duration::from_secs(48 * 3600) ; "hours")]
        #[test_case("240h", Duration::from_secs(240 * 3600) ; "ttl default")]
        #[test_case("1h30m", Duration::from_secs(5400) ; "compound")]
        #[test_case("90s", Duration::from_secs(90) ; "seconds")]
        #[test_case("1.5s", Duration::from_millis(1500) ; "fractional")]
        #[test_case("250ms", Duration::from_millis(250) ; "millis")]
        #[test_case("10us", Duration::from_micros(10) ; "micros")]
        #[test_case("10µs", Duration::from_micros(10) ; "micro sign")]
        #[test_case("7ns", Duration::from_nanos(7) ; "nanos")]
        #[test_case("1m1ms", Duration::from_millis(60_001) ; "minute then milli")]
        #[test_case("0", Duration::ZERO ; "bare zero")]
        #[test_case(" 5m ", Duration::from_secs(300) ; "surrounding whitespace")]
        fn parses_valid_durations(input: &str, expected: Duration) {
            assert_eq!(parse_duration(input).expect("parse"), expected);
        }

        #[test_case("" ; "empty")]
        #[test_case("48" ; "missing unit")]
        #[test_case("h" ; "missing number")]
        #[test_case("-5s" ; "negative")]
        #[test_case("5d" ; "unknown unit")]
        #[test_case("5 s" ; "inner space")]
        #[test_case("1h;DROP" ; "trailing garbage")]
        fn rejects_malformed_durations(input: &str) {
            assert!(matches!(
                parse_duration(input),
                Err(LogStoreError::InvalidConfig(_))
            ));
        }

        #[test]
        fn rejects_overflowing_duration() {
            let input = format!("{}h", "9".repeat(30));
            assert!(matches!(
                parse_duration(&input),
                Err(LogStoreError::InvalidConfig(_))
            ));
        }
    }

    mod logging_config_tests {
        use super::*;

        #[test]
        fn decodes_collaborator_json() {
            let json = r#"{"access_tokens":["t1"],"cleanfrequency":"1h","ttl":"24h"}"#;
            let config: LoggingConfig = serde_json::from_str(json).expect("decode");

            assert_eq!(config.access_tokens, vec!["t1"]);
            let settings = config.retention().expect("retention");
            assert_eq!(settings.frequency, Duration::from_secs(3600));
            assert_eq!(settings.ttl, Duration::from_secs(24 * 3600));
        }

        #[test]
        fn empty_strings_use_defaults() {
            let settings = LoggingConfig::default().retention().expect("retention");
            assert_eq!(settings, RetentionSettings::default());
            assert_eq!(settings.frequency, DEFAULT_CLEAN_FREQUENCY);
            assert_eq!(settings.ttl, DEFAULT_TTL);
        }

        #[test]
        fn zero_frequency_is_rejected() {
            let config = LoggingConfig {
                clean_frequency: "0s".into(),
                ..Default::default()
            };
            assert!(matches!(
                config.retention(),
                Err(LogStoreError::InvalidConfig(_))
            ));
        }

        #[test]
        fn malformed_ttl_is_rejected() {
            let config = LoggingConfig {
                ttl: "ten days".into(),
                ..Default::default()
            };
            assert!(config.retention().is_err());
        }
    }

    mod store_config_tests {
        use super::*;

        #[test]
        fn default_points_at_standard_path() {
            let config = StoreConfig::default();
            assert_eq!(
                config.location,
                StorageLocation::File(PathBuf::from(DEFAULT_DB_PATH))
            );
            assert!(config.tuning);
        }

        #[test]
        fn builders_set_fields() {
            let config = StoreConfig::in_memory().with_tuning(false);
            assert_eq!(config.location, StorageLocation::InMemory);
            assert!(!config.tuning);
        }
    }
}
