use super::{DataType, Value};
use crate::record::ViolationKind;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// The store assigns this column when the record leaves it null.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Null is accepted when the column is nullable or store-generated.
    pub fn accepts_null(&self) -> bool {
        self.nullable || self.auto_increment
    }

    /// Value used when a field is left out of the input mapping.
    pub(crate) fn absent_value(&self) -> Option<Value> {
        match &self.default {
            Some(value) => Some(value.clone()),
            None if self.accepts_null() => Some(Value::Null),
            None => None,
        }
    }

    /// Checks `value` against this column and returns it in canonical form.
    pub fn validate(&self, value: Value) -> std::result::Result<Value, ViolationKind> {
        if value.is_null() {
            if !self.accepts_null() {
                return Err(ViolationKind::NullNotAllowed);
            }
            return Ok(Value::Null);
        }

        let found = value.type_name();
        self.data_type
            .coerce(value)
            .ok_or_else(|| ViolationKind::TypeMismatch {
                expected: self.data_type,
                found,
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|col| col.primary_key)
            .map(|col| col.name.as_str())
            .collect()
    }
}
