//! Data store sessions.
//!
//! A [`Session`] executes upsert statements inside a unit of work and
//! commits it. Two stores ship with the crate:
//!
//! - `memory.rs` - transactional in-memory store, used for tests and
//!   embedding
//! - `sqlite.rs` - SQLite through rusqlite (feature `sqlite`)
//! - `config.rs` - store connection configuration

mod config;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::SqliteConfig;
pub use memory::{MemorySession, MemoryStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSession;

use crate::core::Result;
use crate::upsert::UpsertStatement;
use async_trait::async_trait;

/// The data store collaborator used by upserts.
///
/// Implementations decide transaction semantics: statements executed before
/// `commit` may be rolled back or partially applied by the store, this crate
/// adds no atomicity of its own.
#[async_trait]
pub trait Session: Send {
    /// Executes one statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &UpsertStatement) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
