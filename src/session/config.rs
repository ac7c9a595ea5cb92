use crate::core::{DbError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// SQLite store configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file; `None` opens a private in-memory database
    pub path: Option<PathBuf>,

    /// How long to wait on a locked database before failing
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Set busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Parse from connection string
    ///
    /// Accepted forms: `sqlite::memory:`, `sqlite:///absolute/path.db`,
    /// `sqlite://relative/path.db`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("sqlite:").ok_or_else(|| {
            DbError::ConfigurationError("URL must start with 'sqlite:'".to_string())
        })?;

        if rest == ":memory:" || rest == "//:memory:" {
            return Ok(Self::in_memory());
        }

        let path = rest.strip_prefix("//").ok_or_else(|| {
            DbError::ConfigurationError(format!("Invalid SQLite URL '{}'", url))
        })?;

        if path.is_empty() {
            return Err(DbError::ConfigurationError(
                "SQLite URL is missing a database path".to_string(),
            ));
        }

        Ok(Self::file(path))
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
