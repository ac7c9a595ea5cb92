use super::record_type::{CREATED_ON, MODIFIED_ON, RecordType, is_timestamp_field};
use super::validation::{FieldViolation, ValidationError, ViolationKind};
use crate::core::{DataType, DbError, Result, Value};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A validated instance of a [`RecordType`].
///
/// Field values always satisfy the declared columns: the constructor and
/// every setter go through validation and an invalid value never becomes
/// visible. `created_on` and `modified_on` are owned by the data store and
/// stay unset until a stored row is loaded back.
#[derive(Debug, Clone)]
pub struct Record {
    record_type: Arc<RecordType>,
    values: Vec<Value>,
    created_on: Option<DateTime<Utc>>,
    modified_on: Option<DateTime<Utc>>,
}

impl Record {
    /// Builds a record from a field name → value mapping.
    ///
    /// Fails with every violating field when any field is unknown, missing,
    /// null where not allowed, or of the wrong type.
    pub fn new<I, K>(
        record_type: &Arc<RecordType>,
        fields: I,
    ) -> std::result::Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut supplied: BTreeMap<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        let schema = record_type.schema();
        let mut violations = Vec::new();
        let mut values = Vec::with_capacity(schema.column_count());

        for column in schema.columns() {
            let outcome = match supplied.remove(&column.name) {
                Some(value) => column.validate(value),
                None => column.absent_value().ok_or(ViolationKind::Missing),
            };
            match outcome {
                Ok(value) => values.push(value),
                Err(kind) => {
                    violations.push(FieldViolation::new(&column.name, kind));
                    values.push(Value::Null);
                }
            }
        }

        let created_on = take_timestamp(&mut supplied, CREATED_ON, &mut violations);
        let modified_on = take_timestamp(&mut supplied, MODIFIED_ON, &mut violations);

        for name in supplied.into_keys() {
            violations.push(FieldViolation::new(name, ViolationKind::UnknownField));
        }

        if !violations.is_empty() {
            return Err(ValidationError::new(record_type.table_name(), violations));
        }

        let record = Self {
            record_type: Arc::clone(record_type),
            values,
            created_on,
            modified_on,
        };
        record.validate()?;
        Ok(record)
    }

    /// Builds a record from a JSON object, as produced by serde for typed
    /// models. Nested arrays and objects are carried as JSON text.
    pub fn from_json(record_type: &Arc<RecordType>, json: &JsonValue) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            DbError::SerializationError(format!(
                "Record '{}' must be built from a JSON object",
                record_type.table_name()
            ))
        })?;

        let fields = object.iter().map(|(name, value)| {
            let value = Value::from_json(value).unwrap_or_else(|| Value::Text(value.to_string()));
            (name.clone(), value)
        });

        Ok(Self::new(record_type, fields)?)
    }

    /// Rebuilds a record from a row read back from a data store, timestamps
    /// included.
    pub fn from_stored_row(
        record_type: &Arc<RecordType>,
        row: BTreeMap<String, Value>,
    ) -> Result<Self> {
        Self::new(record_type, row).map_err(|err| {
            DbError::ExecutionError(format!("Stored row does not match its record type: {}", err))
        })
    }

    /// Checks every current field value against the declared columns.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let violations: Vec<FieldViolation> = self
            .record_type
            .schema()
            .columns()
            .iter()
            .zip(&self.values)
            .filter_map(|(column, value)| {
                column
                    .validate(value.clone())
                    .err()
                    .map(|kind| FieldViolation::new(&column.name, kind))
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.record_type.table_name(), violations))
        }
    }

    /// Validates a single assignment without applying it and returns the
    /// value in canonical form.
    pub fn validate_field(
        &self,
        name: &str,
        value: Value,
    ) -> std::result::Result<Value, ValidationError> {
        let kind = if is_timestamp_field(name) {
            ViolationKind::ReadOnly
        } else {
            match self.record_type.schema().get_column(name) {
                Some(column) => match column.validate(value) {
                    Ok(value) => return Ok(value),
                    Err(kind) => kind,
                },
                None => ViolationKind::UnknownField,
            }
        };

        Err(ValidationError::new(
            self.record_type.table_name(),
            vec![FieldViolation::new(name, kind)],
        ))
    }

    /// Assigns a field. On failure the record is left unchanged.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> std::result::Result<(), ValidationError> {
        let value = self.validate_field(name, value.into())?;
        if let Some(idx) = self.record_type.schema().find_column_index(name) {
            self.values[idx] = value;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record_type
            .schema()
            .find_column_index(name)
            .map(|idx| &self.values[idx])
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn table_name(&self) -> &str {
        self.record_type.table_name()
    }

    pub fn created_on(&self) -> Option<DateTime<Utc>> {
        self.created_on
    }

    pub fn modified_on(&self) -> Option<DateTime<Utc>> {
        self.modified_on
    }

    /// Flat field mapping in declaration order, timestamps last.
    pub fn to_field_map(&self) -> Vec<(String, Value)> {
        let columns = self.record_type.schema().columns();
        let mut fields: Vec<(String, Value)> = columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect();
        fields.push((CREATED_ON.to_string(), self.created_on.into()));
        fields.push((MODIFIED_ON.to_string(), self.modified_on.into()));
        fields
    }

    pub fn to_json(&self) -> JsonValue {
        let object: Map<String, JsonValue> = self
            .to_field_map()
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect();
        JsonValue::Object(object)
    }
}

fn take_timestamp(
    supplied: &mut BTreeMap<String, Value>,
    name: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<DateTime<Utc>> {
    let value = supplied.remove(name)?;
    let found = value.type_name();
    match DataType::Timestamp.coerce(value) {
        Some(Value::Timestamp(ts)) => Some(ts),
        Some(_) => None,
        None => {
            violations.push(FieldViolation::new(
                name,
                ViolationKind::TypeMismatch {
                    expected: DataType::Timestamp,
                    found,
                },
            ));
            None
        }
    }
}
