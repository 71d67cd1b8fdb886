//! Typed connector configuration.
//!
//! Raw configuration arrives as a flat `key -> string` map (CLI flags,
//! environment, or a config file). It is validated exactly once into the
//! immutable [`Config`] (destination) or [`SourceConfig`] (source) structs.
//! Which keys exist, which are required, and their defaults are described
//! declaratively by [`DESTINATION_FIELDS`] and [`SOURCE_FIELDS`].

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Connection string to DB2.
pub const KEY_CONNECTION: &str = "connection";
/// Table the connector reads from or writes to.
pub const KEY_TABLE: &str = "table";
/// Column used to detect whether the destination already contains a record.
pub const KEY_PRIMARY_KEY: &str = "primaryKey";
/// Comma separated list of columns the source reads.
pub const KEY_COLUMNS: &str = "columns";
/// Column the snapshot is ordered by.
pub const KEY_ORDERING_COLUMN: &str = "orderingColumn";
/// Maximum number of rows per poll.
pub const KEY_BATCH_SIZE: &str = "batchSize";
/// Backoff between polls once the source has caught up.
pub const KEY_POLL_INTERVAL: &str = "pollInterval";
/// Delete acknowledged rows from the tracking table.
pub const KEY_PRUNE_TRACKING: &str = "pruneTracking";

/// Maximum identifier length accepted by DB2 for table and column names.
pub const MAX_IDENTIFIER_LEN: usize = 128;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const MAX_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised while validating configuration. No database interaction
/// happens before these checks pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field '{field}' is too long: {len} chars (max {max})")]
    IdentifierTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("field '{field}' contains an invalid identifier: '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("field '{field}' is not a valid integer: '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("field '{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("field '{field}' is not a valid duration: '{value}'")]
    InvalidDuration { field: &'static str, value: String },

    #[error("field '{field}' is not a valid boolean: '{value}'")]
    InvalidBool { field: &'static str, value: String },

    #[error("ordering column '{0}' must be included in the column list")]
    OrderingColumnNotInColumns(String),
}

/// Declarative description of one configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

/// Fields understood by the destination (writer).
pub const DESTINATION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: KEY_CONNECTION,
        description: "Connection string to DB2.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_TABLE,
        description: "Name of the table the connector writes to.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_PRIMARY_KEY,
        description: "Column used to detect if the target table already contains the record.",
        required: true,
        default: None,
    },
];

/// Fields understood by the source (iterator).
pub const SOURCE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: KEY_CONNECTION,
        description: "Connection string to DB2.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_TABLE,
        description: "Name of the table the connector reads from.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_PRIMARY_KEY,
        description: "Column whose value becomes the record key.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_COLUMNS,
        description: "Comma separated list of columns to read. All columns when empty.",
        required: false,
        default: None,
    },
    FieldSpec {
        name: KEY_ORDERING_COLUMN,
        description: "Column the snapshot is ordered by. Must be included in the column list.",
        required: true,
        default: None,
    },
    FieldSpec {
        name: KEY_BATCH_SIZE,
        description: "Maximum number of rows returned by one poll.",
        required: false,
        default: Some("1000"),
    },
    FieldSpec {
        name: KEY_POLL_INTERVAL,
        description: "Backoff between polls once no new rows are found (e.g. 500ms, 5s, 1m).",
        required: false,
        default: Some("1s"),
    },
    FieldSpec {
        name: KEY_PRUNE_TRACKING,
        description: "Delete acknowledged rows from the tracking table.",
        required: false,
        default: Some("false"),
    },
];

/// Configuration shared by source and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub connection: String,
    pub table: String,
    pub key: String,
}

impl Config {
    /// Validate the destination configuration.
    pub fn parse(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        check_required(DESTINATION_FIELDS, raw)?;
        Self::parse_common(raw)
    }

    fn parse_common(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let connection = non_empty(raw, KEY_CONNECTION)?.to_string();
        let table = identifier(KEY_TABLE, non_empty(raw, KEY_TABLE)?)?;
        let key = identifier(KEY_PRIMARY_KEY, non_empty(raw, KEY_PRIMARY_KEY)?)?;

        Ok(Self {
            connection,
            table,
            key,
        })
    }
}

/// Source configuration: the common fields plus what the iterator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub config: Config,
    /// Columns to read; empty means all columns of the table
    pub columns: Vec<String>,
    pub ordering_column: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub prune_tracking: bool,
}

impl SourceConfig {
    /// Validate the source configuration.
    pub fn parse(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        check_required(SOURCE_FIELDS, raw)?;
        let config = Config::parse_common(raw)?;

        let ordering_column = identifier(
            KEY_ORDERING_COLUMN,
            non_empty(raw, KEY_ORDERING_COLUMN)?,
        )?;

        let columns = match optional(raw, KEY_COLUMNS) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| identifier(KEY_COLUMNS, c))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        if !columns.is_empty()
            && !columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&ordering_column))
        {
            return Err(ConfigError::OrderingColumnNotInColumns(ordering_column));
        }

        let batch_size = match optional(raw, KEY_BATCH_SIZE) {
            Some(value) => {
                let parsed: usize = value.parse().map_err(|_| ConfigError::InvalidInteger {
                    field: KEY_BATCH_SIZE,
                    value: value.to_string(),
                })?;
                if !(1..=MAX_BATCH_SIZE).contains(&parsed) {
                    return Err(ConfigError::OutOfRange {
                        field: KEY_BATCH_SIZE,
                        value: parsed,
                        min: 1,
                        max: MAX_BATCH_SIZE,
                    });
                }
                parsed
            }
            None => DEFAULT_BATCH_SIZE,
        };

        let poll_interval = match optional(raw, KEY_POLL_INTERVAL) {
            Some(value) => parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
                field: KEY_POLL_INTERVAL,
                value: value.to_string(),
            })?,
            None => DEFAULT_POLL_INTERVAL,
        };

        let prune_tracking = match optional(raw, KEY_PRUNE_TRACKING) {
            Some(value) => value.parse::<bool>().map_err(|_| ConfigError::InvalidBool {
                field: KEY_PRUNE_TRACKING,
                value: value.to_string(),
            })?,
            None => false,
        };

        Ok(Self {
            config,
            columns,
            ordering_column,
            batch_size,
            poll_interval,
            prune_tracking,
        })
    }
}

fn check_required(fields: &[FieldSpec], raw: &HashMap<String, String>) -> Result<(), ConfigError> {
    for field in fields.iter().filter(|f| f.required) {
        if optional(raw, field.name).is_none() {
            return Err(ConfigError::MissingField(field.name));
        }
    }
    Ok(())
}

fn optional<'a>(raw: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    raw.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn non_empty<'a>(
    raw: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    optional(raw, key).ok_or(ConfigError::MissingField(key))
}

/// Validate a DB2 identifier that will be interpolated into SQL text.
///
/// Accepts ordinary identifier characters plus `.` for schema-qualified
/// names; quotes, whitespace and statement separators are rejected. `field`
/// names the configuration key (or record part) the value came from.
pub fn identifier(field: &'static str, value: &str) -> Result<String, ConfigError> {
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ConfigError::IdentifierTooLong {
            field,
            len: value.chars().count(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '#' | '$' | '.'));
    if value.is_empty() || !valid {
        return Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }

    Ok(value.to_string())
}

/// Parse a duration string like "500ms", "30s", "5m", "1h" or "2".
///
/// Plain numbers are interpreted as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num) = s.strip_suffix("ms") {
        return num.parse().ok().map(Duration::from_millis);
    }
    if let Some(num) = s.strip_suffix('h') {
        return num.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600));
    }
    if let Some(num) = s.strip_suffix('m') {
        return num.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    if let Some(num) = s.strip_suffix('s') {
        return num.parse().ok().map(Duration::from_secs);
    }

    s.parse().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION: &str = "HOSTNAME=localhost;DATABASE=testdb;PORT=50000;UID=DB2INST1;PWD=pwd";

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn destination() -> HashMap<String, String> {
        raw(&[
            (KEY_CONNECTION, CONNECTION),
            (KEY_TABLE, "CLIENTS"),
            (KEY_PRIMARY_KEY, "ID"),
        ])
    }

    fn source() -> HashMap<String, String> {
        let mut map = destination();
        map.insert(KEY_ORDERING_COLUMN.to_string(), "ID".to_string());
        map
    }

    #[test]
    fn test_destination_success() {
        let config = Config::parse(&destination()).unwrap();
        assert_eq!(
            config,
            Config {
                connection: CONNECTION.to_string(),
                table: "CLIENTS".to_string(),
                key: "ID".to_string(),
            }
        );
    }

    #[test]
    fn test_destination_missing_fields() {
        for key in [KEY_CONNECTION, KEY_TABLE, KEY_PRIMARY_KEY] {
            let mut map = destination();
            map.insert(key.to_string(), String::new());
            assert_eq!(Config::parse(&map), Err(ConfigError::MissingField(key)));

            map.remove(key);
            assert_eq!(Config::parse(&map), Err(ConfigError::MissingField(key)));
        }
    }

    #[test]
    fn test_destination_table_too_long() {
        let mut map = destination();
        map.insert(KEY_TABLE.to_string(), "T".repeat(129));
        assert!(matches!(
            Config::parse(&map),
            Err(ConfigError::IdentifierTooLong {
                field: KEY_TABLE,
                len: 129,
                max: 128
            })
        ));

        map.insert(KEY_TABLE.to_string(), "T".repeat(128));
        assert!(Config::parse(&map).is_ok());
    }

    #[test]
    fn test_destination_rejects_injection() {
        let mut map = destination();
        map.insert(KEY_TABLE.to_string(), "CLIENTS; DROP TABLE X".to_string());
        assert!(matches!(
            Config::parse(&map),
            Err(ConfigError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_source_defaults() {
        let mut map = source();
        map.insert(KEY_COLUMNS.to_string(), String::new());
        map.insert(KEY_BATCH_SIZE.to_string(), String::new());

        let config = SourceConfig::parse(&map).unwrap();
        assert_eq!(config.config.table, "CLIENTS");
        assert_eq!(config.ordering_column, "ID");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.columns.is_empty());
        assert!(!config.prune_tracking);
    }

    #[test]
    fn test_source_custom_values() {
        let mut map = source();
        map.insert(KEY_COLUMNS.to_string(), "ID, NAME".to_string());
        map.insert(KEY_BATCH_SIZE.to_string(), "50".to_string());
        map.insert(KEY_POLL_INTERVAL.to_string(), "250ms".to_string());
        map.insert(KEY_PRUNE_TRACKING.to_string(), "true".to_string());

        let config = SourceConfig::parse(&map).unwrap();
        assert_eq!(config.columns, vec!["ID".to_string(), "NAME".to_string()]);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.prune_tracking);
    }

    #[test]
    fn test_source_missing_ordering_column() {
        let map = destination();
        assert_eq!(
            SourceConfig::parse(&map),
            Err(ConfigError::MissingField(KEY_ORDERING_COLUMN))
        );
    }

    #[test]
    fn test_source_ordering_column_not_in_columns() {
        let mut map = source();
        map.insert(KEY_COLUMNS.to_string(), "AGE,NAME".to_string());
        assert_eq!(
            SourceConfig::parse(&map),
            Err(ConfigError::OrderingColumnNotInColumns("ID".to_string()))
        );
    }

    #[test]
    fn test_source_ordering_column_matches_ignoring_case() {
        let mut map = source();
        map.insert(KEY_COLUMNS.to_string(), "id,name".to_string());
        let config = SourceConfig::parse(&map).unwrap();
        assert_eq!(config.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(config.ordering_column, "ID");
    }

    #[test]
    fn test_identifier() {
        assert_eq!(identifier(KEY_TABLE, "APP.CLIENTS"), Ok("APP.CLIENTS".to_string()));
        assert!(matches!(
            identifier(KEY_COLUMNS, "NAME) VALUES (1); --"),
            Err(ConfigError::InvalidIdentifier { field: KEY_COLUMNS, .. })
        ));
        assert!(matches!(
            identifier(KEY_COLUMNS, ""),
            Err(ConfigError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_source_batch_size_bounds() {
        for bad in ["0", "100001"] {
            let mut map = source();
            map.insert(KEY_BATCH_SIZE.to_string(), bad.to_string());
            assert!(matches!(
                SourceConfig::parse(&map),
                Err(ConfigError::OutOfRange { .. })
            ));
        }

        let mut map = source();
        map.insert(KEY_BATCH_SIZE.to_string(), "-5".to_string());
        assert!(matches!(
            SourceConfig::parse(&map),
            Err(ConfigError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_field_tables_agree_on_required_fields() {
        for field in DESTINATION_FIELDS {
            let source_field = SOURCE_FIELDS.iter().find(|f| f.name == field.name).unwrap();
            assert_eq!(source_field.required, field.required);
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("300"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("750ms"), Some(Duration::from_millis(750)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
    }
}
