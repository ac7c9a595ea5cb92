use crate::core::{DbError, Result, Value};
use crate::record::{CREATED_ON, MODIFIED_ON, Record};
use std::collections::BTreeSet;
use tracing::debug;

/// A value in an upsert statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementValue {
    Literal(Value),
    /// Current time as generated by the data store at execution.
    Now,
}

/// Store-agnostic "insert this row; on conflict over these columns, set
/// these fields instead" descriptor.
///
/// Dialects translate it into native SQL; stores may also execute it
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatement {
    table: String,
    insert: Vec<(String, StatementValue)>,
    conflict_target: Vec<String>,
    update: Vec<(String, StatementValue)>,
}

impl UpsertStatement {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn insert_values(&self) -> &[(String, StatementValue)] {
        &self.insert
    }

    pub fn conflict_target(&self) -> &[String] {
        &self.conflict_target
    }

    pub fn update_assignments(&self) -> &[(String, StatementValue)] {
        &self.update
    }

    pub fn insert_value(&self, column: &str) -> Option<&StatementValue> {
        lookup(&self.insert, column)
    }

    pub fn update_value(&self, column: &str) -> Option<&StatementValue> {
        lookup(&self.update, column)
    }
}

fn lookup<'a>(entries: &'a [(String, StatementValue)], column: &str) -> Option<&'a StatementValue> {
    entries
        .iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| value)
}

fn assign(entries: &mut Vec<(String, StatementValue)>, column: &str, value: StatementValue) {
    match entries.iter_mut().find(|(name, _)| name == column) {
        Some(entry) => entry.1 = value,
        None => entries.push((column.to_string(), value)),
    }
}

/// Builds the upsert statement for `record`.
///
/// Pure: nothing is executed. `created_on` and `modified_on` are set to the
/// store's current time in the insert branch, and `modified_on` again in the
/// update branch, because a conflict-resolved insert fires neither the
/// store's insert defaults on the existing row nor its on-update hooks.
/// Store-generated columns left null are omitted from both branches.
pub fn build_upsert_statement(
    record: &Record,
    conflict_target: &BTreeSet<String>,
    exclusions: &BTreeSet<String>,
) -> Result<UpsertStatement> {
    if conflict_target.is_empty() {
        return Err(DbError::ConfigurationError(format!(
            "No upsert conflict target specified for '{}'",
            record.table_name()
        )));
    }

    let schema = record.record_type().schema();
    if let Some(unknown) = conflict_target
        .iter()
        .find(|name| schema.get_column(name).is_none())
    {
        return Err(DbError::ConfigurationError(format!(
            "Conflict target '{}' is not a column of '{}'",
            unknown,
            record.table_name()
        )));
    }

    let mut insert: Vec<(String, StatementValue)> = record
        .to_field_map()
        .into_iter()
        .filter(|(name, value)| {
            !(value.is_null() && schema.get_column(name).is_some_and(|col| col.auto_increment))
        })
        .map(|(name, value)| (name, StatementValue::Literal(value)))
        .collect();
    assign(&mut insert, CREATED_ON, StatementValue::Now);
    assign(&mut insert, MODIFIED_ON, StatementValue::Now);

    let mut update: Vec<(String, StatementValue)> = insert
        .iter()
        .filter(|(name, _)| !exclusions.contains(name))
        .cloned()
        .collect();
    assign(&mut update, MODIFIED_ON, StatementValue::Now);

    debug!(
        table = %record.table_name(),
        conflict_target = ?conflict_target,
        insert_columns = insert.len(),
        update_columns = update.len(),
        "built upsert statement"
    );

    Ok(UpsertStatement {
        table: record.table_name().to_string(),
        insert,
        conflict_target: conflict_target.iter().cloned().collect(),
        update,
    })
}

/// Builds the upsert statement for `record` from its record type's policy.
pub fn upsert_statement(record: &Record) -> Result<UpsertStatement> {
    let policy = record.record_type().upsert_policy();
    build_upsert_statement(record, policy.conflict_target(), &policy.effective_exclusions())
}
