use super::statement::{UpsertStatement, upsert_statement};
use crate::core::Result;
use crate::record::Record;
use crate::session::Session;
use tracing::debug;

/// Upserts a single record and commits.
pub async fn upsert_one<S>(record: &Record, session: &mut S) -> Result<()>
where
    S: Session + ?Sized,
{
    let statement = upsert_statement(record)?;
    session.execute(&statement).await?;
    session.commit().await?;

    debug!(table = %record.table_name(), "upserted record");
    Ok(())
}

/// Upserts `records` in input order inside the session's transaction and
/// commits once at the end.
///
/// Every statement is built before the first one is executed, so a record
/// type without a conflict target fails the call before anything reaches
/// the store. Execution failures are returned as-is; whether already issued
/// statements survive is up to the caller's transaction.
pub async fn upsert_many<S>(records: &[Record], session: &mut S) -> Result<()>
where
    S: Session + ?Sized,
{
    let statements = records
        .iter()
        .map(upsert_statement)
        .collect::<Result<Vec<UpsertStatement>>>()?;

    for statement in &statements {
        session.execute(statement).await?;
    }
    session.commit().await?;

    debug!(count = statements.len(), "batch upsert committed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, DbError, Value};
    use crate::record::RecordType;
    use crate::upsert::StatementValue;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum Call {
        Execute(String),
        Commit,
    }

    /// Session double that records calls and can fail on the n-th execute.
    #[derive(Default)]
    struct RecordingSession {
        calls: Vec<Call>,
        fail_on: Option<usize>,
        executed: usize,
    }

    #[async_trait]
    impl Session for RecordingSession {
        async fn execute(&mut self, statement: &UpsertStatement) -> Result<u64> {
            self.executed += 1;
            if self.fail_on == Some(self.executed) {
                return Err(DbError::ExecutionError("disk full".into()));
            }
            let name = match statement.insert_value("name") {
                Some(StatementValue::Literal(Value::Text(name))) => name.clone(),
                _ => String::new(),
            };
            self.calls.push(Call::Execute(name));
            Ok(1)
        }

        async fn commit(&mut self) -> Result<()> {
            self.calls.push(Call::Commit);
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn hero_type(conflict_target: &[&str]) -> Arc<RecordType> {
        RecordType::builder("hero")
            .column(Column::new("id", DataType::Integer).primary_key().auto_increment())
            .column(Column::new("name", DataType::Text).not_null())
            .conflict_target(conflict_target.iter().copied())
            .build()
            .unwrap()
    }

    fn heroes(hero: &Arc<RecordType>, names: &[&str]) -> Vec<Record> {
        names
            .iter()
            .map(|name| Record::new(hero, [("name", Value::from(*name))]).unwrap())
            .collect()
    }

    #[test]
    fn test_upsert_one_executes_then_commits() {
        let hero = hero_type(&["id"]);
        let record = heroes(&hero, &["Deadpond"]).remove(0);
        let mut session = RecordingSession::default();

        tokio_test::block_on(upsert_one(&record, &mut session)).unwrap();

        assert_eq!(
            session.calls,
            vec![Call::Execute("Deadpond".into()), Call::Commit]
        );
    }

    #[test]
    fn test_upsert_many_preserves_order_and_commits_once() {
        let hero = hero_type(&["id"]);
        let records = heroes(&hero, &["Deadpond", "Spider-Boy", "Rusty-Man"]);
        let mut session = RecordingSession::default();

        tokio_test::block_on(upsert_many(&records, &mut session)).unwrap();

        assert_eq!(
            session.calls,
            vec![
                Call::Execute("Deadpond".into()),
                Call::Execute("Spider-Boy".into()),
                Call::Execute("Rusty-Man".into()),
                Call::Commit,
            ]
        );
    }

    #[test]
    fn test_missing_conflict_target_reaches_no_statement() {
        let configured = hero_type(&["id"]);
        let unconfigured = hero_type(&[]);
        let mut records = heroes(&configured, &["Deadpond"]);
        records.extend(heroes(&unconfigured, &["Spider-Boy"]));
        let mut session = RecordingSession::default();

        let err = tokio_test::block_on(upsert_many(&records, &mut session)).unwrap_err();

        assert!(err.is_configuration());
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_execution_failure_propagates_without_commit() {
        let hero = hero_type(&["id"]);
        let records = heroes(&hero, &["Deadpond", "Spider-Boy", "Rusty-Man"]);
        let mut session = RecordingSession {
            fail_on: Some(2),
            ..Default::default()
        };

        let err = tokio_test::block_on(upsert_many(&records, &mut session)).unwrap_err();

        assert!(err.is_execution());
        assert_eq!(session.calls, vec![Call::Execute("Deadpond".into())]);
    }

    #[test]
    fn test_empty_batch_still_commits() {
        let mut session = RecordingSession::default();
        tokio_test::block_on(upsert_many(&[], &mut session)).unwrap();
        assert_eq!(session.calls, vec![Call::Commit]);
    }
}
