use super::{Session, SqliteConfig};
use crate::core::{DataType, DbError, Result, Value};
use crate::dialect::{SqlDialect, SqliteDialect};
use crate::record::{CREATED_ON, MODIFIED_ON, Record, RecordType};
use crate::upsert::UpsertStatement;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Timestamp(ts) => ToSqlOutput::Owned(SqlValue::Text(format_timestamp(ts))),
            Value::Uuid(id) => ToSqlOutput::Owned(SqlValue::Text(id.to_string())),
        })
    }
}

/// Same layout `strftime('%Y-%m-%dT%H:%M:%fZ')` produces, so bound and
/// store-generated timestamps compare correctly as text.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_sql(column: &str, data_type: DataType, value: SqlValue) -> Result<Value> {
    let converted = match (data_type, value) {
        (_, SqlValue::Null) => Value::Null,
        (DataType::Boolean, SqlValue::Integer(i)) => Value::Boolean(i != 0),
        (DataType::Float, SqlValue::Integer(i)) => Value::Float(i as f64),
        (_, SqlValue::Integer(i)) => Value::Integer(i),
        (_, SqlValue::Real(f)) => Value::Float(f),
        (DataType::Timestamp, SqlValue::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
            .map_err(|err| {
                DbError::ExecutionError(format!(
                    "Column '{}' holds an invalid timestamp '{}': {}",
                    column, s, err
                ))
            })?,
        (DataType::Uuid, SqlValue::Text(s)) => uuid::Uuid::parse_str(&s)
            .map(Value::Uuid)
            .map_err(|err| {
                DbError::ExecutionError(format!(
                    "Column '{}' holds an invalid UUID '{}': {}",
                    column, s, err
                ))
            })?,
        (_, SqlValue::Text(s)) => Value::Text(s),
        (_, SqlValue::Blob(_)) => {
            return Err(DbError::ExecutionError(format!(
                "Column '{}' holds a BLOB, which no record field maps to",
                column
            )));
        }
    };
    Ok(converted)
}

/// A session over one SQLite connection.
///
/// The first executed statement opens a transaction; `commit` and
/// `rollback` close it. Dropping the session with an open transaction
/// rolls it back.
pub struct SqliteSession {
    conn: Connection,
    in_transaction: bool,
    dialect: SqliteDialect,
}

impl SqliteSession {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;

        debug!(path = ?config.path, "opened sqlite session");
        Ok(Self {
            conn,
            in_transaction: false,
            dialect: SqliteDialect,
        })
    }

    /// Opens a session from a `sqlite:` connection string.
    pub fn connect(url: &str) -> Result<Self> {
        Self::open(&SqliteConfig::from_url(url)?)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Creates the table backing `record_type` if it does not exist yet.
    pub fn create_table(&self, record_type: &RecordType) -> Result<()> {
        let sql = self.dialect.create_table_sql(record_type);
        self.conn.execute_batch(&sql)?;
        debug!(table = %record_type.table_name(), "created sqlite table");
        Ok(())
    }

    /// Rows of `record_type`'s table as seen by this session, in rowid order.
    pub fn fetch_all(&self, record_type: &Arc<RecordType>) -> Result<Vec<Record>> {
        let mut columns: Vec<(&str, DataType)> = record_type
            .schema()
            .columns()
            .iter()
            .map(|col| (col.name.as_str(), col.data_type))
            .collect();
        columns.push((CREATED_ON, DataType::Timestamp));
        columns.push((MODIFIED_ON, DataType::Timestamp));

        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns
                .iter()
                .map(|(name, _)| self.dialect.quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", "),
            self.dialect.quote_identifier(record_type.table_name())
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt
            .query_map([], |row| {
                (0..columns.len())
                    .map(|idx| row.get::<_, SqlValue>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw_rows
            .into_iter()
            .map(|raw| {
                let row = columns
                    .iter()
                    .zip(raw)
                    .map(|((name, data_type), value)| -> Result<(String, Value)> {
                        Ok((name.to_string(), from_sql(name, *data_type, value)?))
                    })
                    .collect::<Result<BTreeMap<String, Value>>>()?;
                Record::from_stored_row(record_type, row)
            })
            .collect()
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn execute(&mut self, statement: &UpsertStatement) -> Result<u64> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }

        let rendered = self.dialect.render_upsert(statement);
        let affected = self
            .conn
            .execute(&rendered.sql, params_from_iter(rendered.params.iter()))?;

        debug!(table = %statement.table(), affected, "executed upsert on sqlite");
        Ok(affected as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;

        if let Err(err) = self.conn.execute_batch("COMMIT") {
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_err, "rollback after failed commit failed");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("rolled back sqlite session");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("sqlite session dropped inside a transaction, rolling back");
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;
    use crate::upsert::upsert_statement;

    fn gadget_type() -> Arc<RecordType> {
        RecordType::builder("gadget")
            .column(Column::new("sku", DataType::Uuid).not_null())
            .column(Column::new("name", DataType::Text).not_null())
            .column(Column::new("price", DataType::Float))
            .column(Column::new("in_stock", DataType::Boolean).not_null())
            .conflict_target(["sku"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_timestamp_format_matches_strftime() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T08:15:30.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2026-03-01T08:15:30.250Z");
    }

    #[tokio::test]
    async fn test_typed_columns_round_trip_through_sqlite() {
        let record_type = gadget_type();
        let mut session = SqliteSession::open(&SqliteConfig::in_memory()).unwrap();
        session.create_table(&record_type).unwrap();

        let sku = uuid::Uuid::new_v4();
        let record = Record::new(
            &record_type,
            [
                ("sku", Value::Uuid(sku)),
                ("name", "Grappling hook".into()),
                ("price", Value::Integer(12)),
                ("in_stock", Value::Boolean(true)),
            ],
        )
        .unwrap();
        session.execute(&upsert_statement(&record).unwrap()).await.unwrap();
        assert!(session.in_transaction());
        session.commit().await.unwrap();
        assert!(!session.in_transaction());

        let stored = session.fetch_all(&record_type).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("sku"), Some(&Value::Uuid(sku)));
        assert_eq!(stored[0].get("price"), Some(&Value::Float(12.0)));
        assert_eq!(stored[0].get("in_stock"), Some(&Value::Boolean(true)));
        assert!(stored[0].created_on().is_some());
        assert!(stored[0].modified_on().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let record_type = gadget_type();
        let mut session = SqliteSession::open(&SqliteConfig::in_memory()).unwrap();
        session.create_table(&record_type).unwrap();

        let record = Record::new(
            &record_type,
            [
                ("sku", Value::Uuid(uuid::Uuid::new_v4())),
                ("name", "Smoke pellet".into()),
                ("in_stock", Value::Boolean(false)),
            ],
        )
        .unwrap();
        session.execute(&upsert_statement(&record).unwrap()).await.unwrap();
        assert_eq!(session.fetch_all(&record_type).unwrap().len(), 1);

        session.rollback().await.unwrap();
        assert!(session.fetch_all(&record_type).unwrap().is_empty());
    }

    #[test]
    fn test_blob_column_is_rejected() {
        let err = from_sql("name", DataType::Text, SqlValue::Blob(vec![1, 2])).unwrap_err();
        assert!(err.is_execution());
    }
}
