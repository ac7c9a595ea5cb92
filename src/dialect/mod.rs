//! SQL rendering of upsert statements and record type tables.
//!
//! An [`UpsertStatement`] is store-agnostic; a [`SqlDialect`] turns it into
//! native SQL text with positional parameters. Only quoting, placeholder
//! syntax, the current-time expression and column types differ between
//! dialects.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::core::{Column, DataType, Value};
use crate::record::{CREATED_ON, MODIFIED_ON, RecordType};
use crate::upsert::{StatementValue, UpsertStatement};
use std::collections::HashMap;

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

pub trait SqlDialect: Send + Sync {
    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Expression evaluating to the store's current time.
    fn current_timestamp(&self) -> &'static str;

    fn column_type(&self, data_type: DataType) -> &'static str;

    /// Value assigned to `modified_on` by the update branch. It must be
    /// strictly later than the stored value even when the clock has not
    /// advanced past it.
    fn advance_timestamp(&self, table: &str, column: &str) -> String;

    /// Clause appended to store-generated integer columns, if the dialect
    /// needs one.
    fn auto_increment_clause(&self) -> Option<&'static str> {
        None
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Renders `INSERT .. ON CONFLICT (..) DO UPDATE SET ..`.
    ///
    /// Update literals reuse the placeholder of the same column in the
    /// insert branch, so each value is bound once.
    fn render_upsert(&self, statement: &UpsertStatement) -> RenderedSql {
        let mut params: Vec<Value> = Vec::new();
        let mut slots: HashMap<&str, (String, &Value)> = HashMap::new();

        let mut columns = Vec::with_capacity(statement.insert_values().len());
        let mut values = Vec::with_capacity(statement.insert_values().len());
        for (name, value) in statement.insert_values() {
            columns.push(self.quote_identifier(name));
            let rendered = match value {
                StatementValue::Now => self.current_timestamp().to_string(),
                StatementValue::Literal(literal) => {
                    params.push(literal.clone());
                    let placeholder = self.placeholder(params.len());
                    slots.insert(name.as_str(), (placeholder.clone(), literal));
                    placeholder
                }
            };
            values.push(rendered);
        }

        let target: Vec<String> = statement
            .conflict_target()
            .iter()
            .map(|name| self.quote_identifier(name))
            .collect();

        let mut assignments = Vec::with_capacity(statement.update_assignments().len());
        for (name, value) in statement.update_assignments() {
            let rendered = match value {
                StatementValue::Now if name == MODIFIED_ON => {
                    self.advance_timestamp(statement.table(), name)
                }
                StatementValue::Now => self.current_timestamp().to_string(),
                StatementValue::Literal(literal) => match slots.get(name.as_str()) {
                    Some((placeholder, bound)) if *bound == literal => placeholder.clone(),
                    _ => {
                        params.push(literal.clone());
                        self.placeholder(params.len())
                    }
                },
            };
            assignments.push(format!("{} = {}", self.quote_identifier(name), rendered));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.quote_identifier(statement.table()),
            columns.join(", "),
            values.join(", "),
            target.join(", "),
            assignments.join(", ")
        );

        RenderedSql { sql, params }
    }

    fn column_definition(&self, column: &Column, inline_primary_key: bool) -> String {
        let mut def = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column.data_type)
        );
        if column.auto_increment {
            if let Some(clause) = self.auto_increment_clause() {
                def.push(' ');
                def.push_str(clause);
            }
        }
        if inline_primary_key {
            def.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                def.push_str(" NOT NULL");
            }
            if column.unique {
                def.push_str(" UNIQUE");
            }
        }
        def
    }

    /// `CREATE TABLE IF NOT EXISTS` for a record type, including the two
    /// store-defaulted timestamp columns and a unique constraint backing the
    /// conflict target.
    fn create_table_sql(&self, record_type: &RecordType) -> String {
        let schema = record_type.schema();
        let primary_key = schema.primary_key();
        let inline_pk = primary_key.len() == 1;

        let mut defs: Vec<String> = schema
            .columns()
            .iter()
            .map(|column| self.column_definition(column, inline_pk && column.primary_key))
            .collect();

        for name in [CREATED_ON, MODIFIED_ON] {
            defs.push(format!(
                "{} {} NOT NULL DEFAULT ({})",
                self.quote_identifier(name),
                self.column_type(DataType::Timestamp),
                self.current_timestamp()
            ));
        }

        let quote_all = |names: &[&str]| -> String {
            names
                .iter()
                .map(|name| self.quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", ")
        };

        if primary_key.len() > 1 {
            defs.push(format!("PRIMARY KEY ({})", quote_all(&primary_key[..])));
        }

        let target: Vec<&str> = record_type
            .upsert_policy()
            .conflict_target()
            .iter()
            .map(String::as_str)
            .collect();
        if !target.is_empty() && !is_declared_unique(record_type, &target) {
            defs.push(format!("UNIQUE ({})", quote_all(&target[..])));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(record_type.table_name()),
            defs.join(", ")
        )
    }
}

/// Whether `columns` already carry a unique constraint of their own.
fn is_declared_unique(record_type: &RecordType, columns: &[&str]) -> bool {
    let schema = record_type.schema();
    let mut primary_key = schema.primary_key();
    let mut wanted = columns.to_vec();
    primary_key.sort_unstable();
    wanted.sort_unstable();
    if primary_key == wanted {
        return true;
    }

    match columns {
        [single] => schema.get_column(single).is_some_and(|col| col.unique),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(SqliteDialect.quote_identifier("hero"), "\"hero\"");
        assert_eq!(SqliteDialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
