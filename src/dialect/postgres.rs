use super::SqlDialect;
use crate::core::DataType;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn current_timestamp(&self) -> &'static str {
        "now()"
    }

    // now() is the transaction start time, shared by every statement in it.
    fn advance_timestamp(&self, table: &str, column: &str) -> String {
        format!(
            "GREATEST(now(), {}.{} + interval '1 microsecond')",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    fn column_type(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE PRECISION",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Timestamp => "TIMESTAMPTZ",
            DataType::Uuid => "UUID",
        }
    }

    fn auto_increment_clause(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }
}
