use crate::record::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DbError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::ExecutionError(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::ExecutionError(format!("Lock poisoned: {}", err))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::ExecutionError(err.to_string())
    }
}
