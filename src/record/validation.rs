//! Validation outcome types.
//!
//! Validation is whole-object: every violating field is reported, not only
//! the first one encountered.

use crate::core::DataType;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A non-null field without default was left out of the input.
    Missing,
    /// Null supplied for a non-null field.
    NullNotAllowed,
    TypeMismatch {
        expected: DataType,
        found: &'static str,
    },
    /// The record type declares no such field.
    UnknownField,
    /// The field is owned by the store and cannot be assigned.
    ReadOnly,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "field required"),
            Self::NullNotAllowed => write!(f, "input should not be null"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "input should be a valid {}, got {}", expected, found)
            }
            Self::UnknownField => write!(f, "unknown field"),
            Self::ReadOnly => write!(f, "field is managed by the data store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{count} validation error(s) for {record}: {details}", count = .violations.len(), details = join_violations(.violations))]
pub struct ValidationError {
    pub record: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(record: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            record: record.into(),
            violations,
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn violation_for(&self, field: &str) -> Option<&ViolationKind> {
        self.violations
            .iter()
            .find(|v| v.field == field)
            .map(|v| &v.kind)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
