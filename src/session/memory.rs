// ============================================================================
// In-memory transactional store
// ============================================================================
//
// Sessions work on a private copy of the catalog and log every applied
// statement. COMMIT replays the log against the committed tables under the
// write lock, ROLLBACK (or dropping the session) discards both.
//
// ============================================================================

use super::Session;
use crate::core::{DbError, Result, Value};
use crate::record::{CREATED_ON, MODIFIED_ON, Record, RecordType, is_timestamp_field};
use crate::upsert::{StatementValue, UpsertStatement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

type Row = BTreeMap<String, Value>;
type Catalog = HashMap<String, MemoryTable>;

#[derive(Debug, Clone)]
struct MemoryTable {
    record_type: Arc<RecordType>,
    /// Sorted column sets that must be unique across rows.
    unique_keys: Vec<Vec<String>>,
    /// Rows in insertion order.
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn new(record_type: Arc<RecordType>) -> Self {
        let schema = record_type.schema();
        let mut unique_keys: Vec<Vec<String>> = Vec::new();

        let primary_key: Vec<String> = schema.primary_key().into_iter().map(String::from).collect();
        if !primary_key.is_empty() {
            unique_keys.push(primary_key);
        }
        for column in schema.columns().iter().filter(|col| col.unique) {
            unique_keys.push(vec![column.name.clone()]);
        }
        let target: Vec<String> = record_type
            .upsert_policy()
            .conflict_target()
            .iter()
            .cloned()
            .collect();
        if !target.is_empty() {
            unique_keys.push(target);
        }

        for key in &mut unique_keys {
            key.sort();
        }
        unique_keys.sort();
        unique_keys.dedup();

        Self {
            record_type,
            unique_keys,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn name(&self) -> &str {
        self.record_type.table_name()
    }

    fn check_column(&self, name: &str) -> Result<()> {
        if is_timestamp_field(name) || self.record_type.schema().get_column(name).is_some() {
            return Ok(());
        }
        Err(DbError::ExecutionError(format!(
            "Column '{}' not found in table '{}'",
            name,
            self.name()
        )))
    }

    /// Applies one upsert. The table is only modified when every constraint
    /// holds. Values generated for omitted auto-increment columns are taken
    /// from `generated` when present and recorded there otherwise, so a
    /// replayed statement assigns the same keys. Call
    /// [`MemoryTable::reassign_taken_keys`] before replaying.
    fn apply(
        &mut self,
        statement: &UpsertStatement,
        now: DateTime<Utc>,
        generated: &mut Row,
    ) -> Result<u64> {
        let mut target = statement.conflict_target().to_vec();
        target.sort();
        if !self.unique_keys.contains(&target) {
            return Err(DbError::ExecutionError(format!(
                "No unique constraint on '{}' matches the ON CONFLICT target ({})",
                self.name(),
                target.join(", ")
            )));
        }

        let mut row = Row::new();
        for (name, value) in statement.insert_values() {
            self.check_column(name)?;
            row.insert(name.clone(), resolve(value, now));
        }

        let schema = self.record_type.schema();
        for column in schema.columns() {
            if row.contains_key(&column.name) {
                continue;
            }
            let value = if column.auto_increment {
                generated
                    .entry(column.name.clone())
                    .or_insert(Value::Integer(self.next_id))
                    .clone()
            } else {
                column.default.clone().unwrap_or(Value::Null)
            };
            row.insert(column.name.clone(), value);
        }
        for name in [CREATED_ON, MODIFIED_ON] {
            row.entry(name.to_string())
                .or_insert(Value::Timestamp(now));
        }

        match self.find_conflict(&target, &row) {
            Some(idx) => {
                let mut updated = self.rows[idx].clone();
                for (name, value) in statement.update_assignments() {
                    self.check_column(name)?;
                    updated.insert(name.clone(), resolve(value, now));
                }
                self.check_row(&updated, Some(idx))?;
                self.rows[idx] = updated;
            }
            None => {
                self.check_row(&row, None)?;
                for column in schema.columns().iter().filter(|col| col.auto_increment) {
                    if let Some(Value::Integer(id)) = row.get(&column.name) {
                        self.next_id = self.next_id.max(id.saturating_add(1));
                    }
                }
                self.rows.push(row);
            }
        }

        Ok(1)
    }

    /// Replaces generated keys that another session committed in the
    /// meantime with fresh ones from this table's sequence.
    fn reassign_taken_keys(&mut self, generated: &mut Row) {
        for (name, value) in generated.iter_mut() {
            let taken = self.rows.iter().any(|row| row.get(name) == Some(&*value));
            if taken {
                *value = Value::Integer(self.next_id);
                self.next_id = self.next_id.saturating_add(1);
            }
        }
    }

    /// Row whose conflict target equals `row`'s. Nulls never conflict.
    fn find_conflict(&self, target: &[String], row: &Row) -> Option<usize> {
        let key: Vec<&Value> = target
            .iter()
            .map(|name| row.get(name).unwrap_or(&Value::Null))
            .collect();
        if key.iter().any(|value| value.is_null()) {
            return None;
        }

        self.rows.iter().position(|existing| {
            target
                .iter()
                .zip(&key)
                .all(|(name, value)| existing.get(name) == Some(*value))
        })
    }

    fn check_row(&self, row: &Row, skip: Option<usize>) -> Result<()> {
        for column in self.record_type.schema().columns() {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !column.nullable {
                    return Err(DbError::ExecutionError(format!(
                        "NOT NULL constraint failed: {}.{}",
                        self.name(),
                        column.name
                    )));
                }
                continue;
            }
            if !column.data_type.is_compatible(value) {
                return Err(DbError::ExecutionError(format!(
                    "Column '{}' expects type {}, got {}",
                    column.name,
                    column.data_type,
                    value.type_name()
                )));
            }
        }

        for key in &self.unique_keys {
            let values: Vec<&Value> = key
                .iter()
                .map(|name| row.get(name).unwrap_or(&Value::Null))
                .collect();
            if values.iter().any(|value| value.is_null()) {
                continue;
            }
            let duplicate = self.rows.iter().enumerate().any(|(idx, existing)| {
                Some(idx) != skip
                    && key
                        .iter()
                        .zip(&values)
                        .all(|(name, value)| existing.get(name) == Some(*value))
            });
            if duplicate {
                return Err(DbError::ExecutionError(format!(
                    "UNIQUE constraint failed: {}.{}",
                    self.name(),
                    key.join(", ")
                )));
            }
        }

        Ok(())
    }

    fn records(&self, record_type: &Arc<RecordType>) -> Result<Vec<Record>> {
        self.rows
            .iter()
            .map(|row| Record::from_stored_row(record_type, row.clone()))
            .collect()
    }
}

fn resolve(value: &StatementValue, now: DateTime<Utc>) -> Value {
    match value {
        StatementValue::Literal(value) => value.clone(),
        StatementValue::Now => Value::Timestamp(now),
    }
}

fn table_not_found(name: &str) -> DbError {
    DbError::ExecutionError(format!("Table '{}' not found", name))
}

/// Hands out strictly increasing timestamps, so two writes never share the
/// same "now" even when the system clock does not advance between them.
#[derive(Debug, Default)]
struct StoreClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl StoreClock {
    fn now(&self) -> Result<DateTime<Utc>> {
        let mut last = self.last.lock()?;
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + chrono::Duration::microseconds(1);
            }
        }
        *last = Some(now);
        Ok(now)
    }
}

/// Shared in-memory data store. Cloning yields another handle to the same
/// tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Catalog>>,
    clock: Arc<StoreClock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the table backing `record_type`. Unique constraints cover the
    /// primary key, every unique column and the conflict target.
    pub async fn create_table(&self, record_type: &Arc<RecordType>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let name = record_type.table_name().to_string();
        if tables.contains_key(&name) {
            return Err(DbError::ExecutionError(format!("Table '{}' already exists", name)));
        }

        debug!(table = %name, "created memory table");
        tables.insert(name, MemoryTable::new(Arc::clone(record_type)));
        Ok(())
    }

    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            working: None,
            log: Vec::new(),
        }
    }

    /// Committed rows of `record_type`'s table, in insertion order.
    pub async fn fetch_all(&self, record_type: &Arc<RecordType>) -> Result<Vec<Record>> {
        let tables = self.tables.read().await;
        tables
            .get(record_type.table_name())
            .ok_or_else(|| table_not_found(record_type.table_name()))?
            .records(record_type)
    }

    pub async fn row_count(&self, table_name: &str) -> Result<usize> {
        let tables = self.tables.read().await;
        tables
            .get(table_name)
            .map(|table| table.rows.len())
            .ok_or_else(|| table_not_found(table_name))
    }
}

#[derive(Debug, Clone)]
struct LoggedWrite {
    statement: UpsertStatement,
    now: DateTime<Utc>,
    generated: Row,
}

/// A unit of work against a [`MemoryStore`].
///
/// Writes are visible through [`MemorySession::fetch_all`] right away and to
/// other sessions after `commit`. A failed commit discards the transaction.
pub struct MemorySession {
    store: MemoryStore,
    working: Option<Catalog>,
    log: Vec<LoggedWrite>,
}

impl MemorySession {
    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    /// Rows of `record_type`'s table as seen by this session.
    pub async fn fetch_all(&self, record_type: &Arc<RecordType>) -> Result<Vec<Record>> {
        match &self.working {
            Some(working) => working
                .get(record_type.table_name())
                .ok_or_else(|| table_not_found(record_type.table_name()))?
                .records(record_type),
            None => self.store.fetch_all(record_type).await,
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(&mut self, statement: &UpsertStatement) -> Result<u64> {
        if self.working.is_none() {
            let snapshot = self.store.tables.read().await.clone();
            self.working = Some(snapshot);
        }
        let now = self.store.clock.now()?;

        let Some(working) = self.working.as_mut() else {
            return Err(DbError::ExecutionError("No active transaction".to_string()));
        };
        let table = working
            .get_mut(statement.table())
            .ok_or_else(|| table_not_found(statement.table()))?;

        let mut generated = Row::new();
        let affected = table.apply(statement, now, &mut generated)?;
        self.log.push(LoggedWrite {
            statement: statement.clone(),
            now,
            generated,
        });

        debug!(table = %statement.table(), affected, "executed upsert in memory session");
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        let log = std::mem::take(&mut self.log);
        self.working = None;
        if log.is_empty() {
            return Ok(());
        }

        let mut tables = self.store.tables.write().await;
        let mut staged: Catalog = HashMap::new();
        for write in &log {
            let name = write.statement.table();
            let table = match staged.entry(name.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let committed = tables.get(name).cloned().ok_or_else(|| table_not_found(name))?;
                    entry.insert(committed)
                }
            };
            let mut generated = write.generated.clone();
            table.reassign_taken_keys(&mut generated);
            table.apply(&write.statement, write.now, &mut generated)?;
        }

        let touched: BTreeSet<&str> = log.iter().map(|write| write.statement.table()).collect();
        debug!(statements = log.len(), tables = ?touched, "committed memory session");
        tables.extend(staged);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.log.is_empty() {
            debug!(statements = self.log.len(), "rolled back memory session");
        }
        self.log.clear();
        self.working = None;
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.log.is_empty() {
            warn!(
                statements = self.log.len(),
                "memory session dropped with uncommitted writes, rolling back"
            );
        }
    }
}
