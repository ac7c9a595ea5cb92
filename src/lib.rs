// ============================================================================
// Rowbase Library
// ============================================================================
//
// Record types with store-owned timestamps, eager validation and a generic
// UPSERT built from a per-type conflict policy.
//
// ============================================================================

pub mod core;
pub mod dialect;
pub mod record;
pub mod session;
pub mod upsert;

// Re-export main types for convenience
pub use crate::core::{Column, DataType, DbError, Result, Schema, Value};
pub use dialect::{PostgresDialect, RenderedSql, SqlDialect, SqliteDialect};
pub use record::{
    CREATED_ON, FieldViolation, MODIFIED_ON, Model, Record, RecordType, RecordTypeBuilder,
    ValidationError, ViolationKind,
};
pub use session::{MemorySession, MemoryStore, Session, SqliteConfig};
#[cfg(feature = "sqlite")]
pub use session::SqliteSession;
pub use upsert::{
    StatementValue, UpsertPolicy, UpsertStatement, build_upsert_statement, upsert_many,
    upsert_one, upsert_statement,
};
