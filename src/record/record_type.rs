use crate::core::{Column, DbError, Result, Schema};
use crate::upsert::UpsertPolicy;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Creation timestamp, set by the store on insert and never updated.
pub const CREATED_ON: &str = "created_on";

/// Modification timestamp, set by the store on insert and on every update.
pub const MODIFIED_ON: &str = "modified_on";

pub(crate) fn is_timestamp_field(name: &str) -> bool {
    name == CREATED_ON || name == MODIFIED_ON
}

/// A registered record type: table, declared columns and upsert policy.
///
/// Built once through [`RecordType::builder`] and shared behind an `Arc`;
/// the configuration is never mutated after registration.
#[derive(Debug)]
pub struct RecordType {
    table_name: String,
    schema: Schema,
    upsert_policy: UpsertPolicy,
}

impl RecordType {
    pub fn builder(table_name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            table_name: table_name.into(),
            columns: Vec::new(),
            conflict_target: BTreeSet::new(),
            update_exclude: BTreeSet::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn upsert_policy(&self) -> &UpsertPolicy {
        &self.upsert_policy
    }

    /// Declared columns followed by the two timestamp fields.
    pub fn field_names(&self) -> Vec<&str> {
        self.schema
            .columns()
            .iter()
            .map(|col| col.name.as_str())
            .chain([CREATED_ON, MODIFIED_ON])
            .collect()
    }
}

pub struct RecordTypeBuilder {
    table_name: String,
    columns: Vec<Column>,
    conflict_target: BTreeSet<String>,
    update_exclude: BTreeSet<String>,
}

impl RecordTypeBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Fields whose equality identifies an existing row for upserts.
    pub fn conflict_target<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_target.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Fields left untouched by the update branch of an upsert.
    pub fn exclude_from_update<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Arc<RecordType>> {
        if self.table_name.trim().is_empty() {
            return Err(DbError::ConfigurationError(
                "Record type requires a table name".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if is_timestamp_field(&column.name) {
                return Err(DbError::ConfigurationError(format!(
                    "Column '{}' in '{}' is reserved for timestamp bookkeeping",
                    column.name, self.table_name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::ConfigurationError(format!(
                    "Duplicate column '{}' in '{}'",
                    column.name, self.table_name
                )));
            }
        }

        for field in &self.conflict_target {
            if !seen.contains(field.as_str()) {
                return Err(DbError::ConfigurationError(format!(
                    "Conflict target '{}' is not a column of '{}'",
                    field, self.table_name
                )));
            }
        }

        for field in &self.update_exclude {
            if !seen.contains(field.as_str()) && !is_timestamp_field(field) {
                return Err(DbError::ConfigurationError(format!(
                    "Excluded field '{}' is not a column of '{}'",
                    field, self.table_name
                )));
            }
        }

        debug!(
            table = %self.table_name,
            columns = self.columns.len(),
            conflict_target = ?self.conflict_target,
            "registered record type"
        );

        Ok(Arc::new(RecordType {
            table_name: self.table_name,
            schema: Schema::new(self.columns),
            upsert_policy: UpsertPolicy::new(self.conflict_target, self.update_exclude),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn hero_builder() -> RecordTypeBuilder {
        RecordType::builder("hero")
            .column(Column::new("id", DataType::Integer).primary_key().auto_increment())
            .column(Column::new("name", DataType::Text).not_null())
    }

    #[test]
    fn test_build_record_type() {
        let hero = hero_builder().conflict_target(["id"]).build().unwrap();
        assert_eq!(hero.table_name(), "hero");
        assert_eq!(hero.field_names(), vec!["id", "name", "created_on", "modified_on"]);
        assert!(hero.upsert_policy().conflict_target().contains("id"));
    }

    #[test]
    fn test_empty_conflict_target_is_accepted_at_registration() {
        let hero = hero_builder().build().unwrap();
        assert!(hero.upsert_policy().conflict_target().is_empty());
    }

    #[test]
    fn test_reserved_and_duplicate_columns_rejected() {
        let err = hero_builder()
            .column(Column::new("created_on", DataType::Timestamp))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = hero_builder()
            .column(Column::new("name", DataType::Text))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_policy_fields_rejected() {
        let err = hero_builder().conflict_target(["email"]).build().unwrap_err();
        assert!(err.is_configuration());

        let err = hero_builder()
            .conflict_target(["id"])
            .exclude_from_update(["nickname"])
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        assert!(hero_builder()
            .conflict_target(["id"])
            .exclude_from_update(["modified_on"])
            .build()
            .is_ok());
    }

    #[test]
    fn test_blank_table_name_rejected() {
        let err = RecordType::builder("  ").build().unwrap_err();
        assert!(err.is_configuration());
    }
}
