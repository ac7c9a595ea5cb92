//! Generic UPSERT for any registered record type.
//!
//! - `policy.rs` - conflict target and update exclusions per record type
//! - `statement.rs` - builds the insert-or-update descriptor for one record
//! - `batch.rs` - executes single and batch upserts against a session

mod batch;
mod policy;
mod statement;

pub use batch::{upsert_many, upsert_one};
pub use policy::{DEFAULT_UPDATE_EXCLUDE, UpsertPolicy};
pub use statement::{StatementValue, UpsertStatement, build_upsert_statement, upsert_statement};
