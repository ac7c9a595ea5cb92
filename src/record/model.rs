use super::{Record, RecordType};
use crate::core::Result;
use crate::session::Session;
use crate::upsert;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// A strongly-typed record bound to a registered [`RecordType`].
///
/// Implementors are plain serde structs whose field names match the
/// declared columns; `created_on` / `modified_on` may be declared as
/// `Option<DateTime<Utc>>` to read the store-owned timestamps back.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Hero {
///     id: Option<i64>,
///     name: String,
///     secret_name: String,
///     age: Option<i64>,
/// }
///
/// impl Model for Hero {
///     fn record_type() -> Arc<RecordType> {
///         HERO.clone()
///     }
/// }
///
/// hero.upsert(&mut session).await?;
/// ```
#[async_trait]
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Sized {
    fn record_type() -> Arc<RecordType>;

    /// Serializes and validates this value as a [`Record`].
    fn to_record(&self) -> Result<Record> {
        let json = serde_json::to_value(self)?;
        Record::from_json(&Self::record_type(), &json)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(serde_json::from_value(record.to_json())?)
    }

    async fn upsert<S>(&self, session: &mut S) -> Result<()>
    where
        S: Session + ?Sized,
    {
        let record = self.to_record()?;
        upsert::upsert_one(&record, session).await
    }

    async fn batch_upsert<S>(items: &[Self], session: &mut S) -> Result<()>
    where
        S: Session + ?Sized,
    {
        let records = items
            .iter()
            .map(Self::to_record)
            .collect::<Result<Vec<_>>>()?;
        upsert::upsert_many(&records, session).await
    }
}
