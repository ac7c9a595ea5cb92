use super::SqlDialect;
use crate::core::DataType;

/// SQLite 3.24+ (`ON CONFLICT .. DO UPDATE`).
///
/// Timestamps are stored as ISO-8601 UTC text with millisecond precision so
/// that they sort chronologically and parse as RFC 3339.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

pub(crate) const SQLITE_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

impl SqlDialect for SqliteDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn current_timestamp(&self) -> &'static str {
        SQLITE_NOW
    }

    // Two writes within the same millisecond would otherwise store equal
    // timestamps.
    fn advance_timestamp(&self, table: &str, column: &str) -> String {
        format!(
            "max({}, strftime('%Y-%m-%dT%H:%M:%fZ', {}.{}, '+0.001 seconds'))",
            SQLITE_NOW,
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    fn column_type(&self, data_type: DataType) -> &'static str {
        match data_type {
            // A single INTEGER PRIMARY KEY aliases the rowid and is
            // assigned by SQLite when omitted.
            DataType::Integer => "INTEGER",
            DataType::Float => "REAL",
            DataType::Text => "TEXT",
            DataType::Boolean => "INTEGER",
            DataType::Timestamp => "TEXT",
            DataType::Uuid => "TEXT",
        }
    }
}
