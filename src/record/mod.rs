//! Record base type.
//!
//! - `record_type.rs` - registered record types and their builder
//! - `instance.rs` - validated record instances
//! - `validation.rs` - whole-object validation errors
//! - `model.rs` - strongly-typed records over serde

mod instance;
mod model;
mod record_type;
mod validation;

pub use instance::Record;
pub use model::Model;
pub use record_type::{CREATED_ON, MODIFIED_ON, RecordType, RecordTypeBuilder};
pub(crate) use record_type::is_timestamp_field;
pub use validation::{FieldViolation, ValidationError, ViolationKind};
