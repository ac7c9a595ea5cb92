/// Upsert tests against the in-memory store
///
/// Run with: cargo test --test memory_upsert_tests

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rowbase::{
    Column, DataType, MemoryStore, Model, Record, RecordType, Session, Value, upsert_many,
    upsert_one, upsert_statement,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

lazy_static! {
    static ref HERO: Arc<RecordType> = RecordType::builder("hero")
        .column(Column::new("id", DataType::Integer).primary_key().auto_increment())
        .column(Column::new("name", DataType::Text).not_null())
        .column(Column::new("secret_name", DataType::Text).not_null())
        .column(Column::new("age", DataType::Integer))
        .conflict_target(["id"])
        .build()
        .unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hero {
    id: Option<i64>,
    name: String,
    secret_name: String,
    age: Option<i64>,
    #[serde(default, skip_serializing)]
    created_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    modified_on: Option<DateTime<Utc>>,
}

impl Hero {
    fn new(id: Option<i64>, name: &str, secret_name: &str, age: Option<i64>) -> Self {
        Self {
            id,
            name: name.to_string(),
            secret_name: secret_name.to_string(),
            age,
            created_on: None,
            modified_on: None,
        }
    }
}

impl Model for Hero {
    fn record_type() -> Arc<RecordType> {
        HERO.clone()
    }
}

async fn hero_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table(&HERO).await.unwrap();
    store
}

async fn stored_heroes(store: &MemoryStore) -> Vec<Hero> {
    store
        .fetch_all(&HERO)
        .await
        .unwrap()
        .iter()
        .map(|record| Hero::from_record(record).unwrap())
        .collect()
}

#[tokio::test]
async fn test_upsert_inserts_with_generated_id() {
    let store = hero_store().await;
    let mut session = store.session();

    Hero::new(None, "Deadpond", "Dive Wilson", None)
        .upsert(&mut session)
        .await
        .unwrap();

    let heroes = stored_heroes(&store).await;
    assert_eq!(heroes.len(), 1);
    assert_eq!(heroes[0].id, Some(1));
    assert_eq!(heroes[0].name, "Deadpond");
    assert!(heroes[0].created_on.is_some());
    assert!(heroes[0].modified_on.is_some());
}

#[tokio::test]
async fn test_batch_upsert_keeps_input_order() {
    let store = hero_store().await;
    let mut session = store.session();

    let batch = vec![
        Hero::new(Some(1), "Deadpond", "Dive Wilson", None),
        Hero::new(Some(2), "Spider-Boy", "Pedro Parqueador", None),
        Hero::new(Some(3), "Rusty-Man", "Tommy Sharp", Some(48)),
    ];
    Hero::batch_upsert(&batch, &mut session).await.unwrap();

    let names: Vec<String> = stored_heroes(&store)
        .await
        .into_iter()
        .map(|hero| hero.name)
        .collect();
    assert_eq!(names, vec!["Deadpond", "Spider-Boy", "Rusty-Man"]);
}

#[tokio::test]
async fn test_second_upsert_updates_and_bumps_modified_on() {
    let store = hero_store().await;
    let mut session = store.session();

    Hero::new(Some(1), "Deadpond", "Dive Wilson", None)
        .upsert(&mut session)
        .await
        .unwrap();
    let first = stored_heroes(&store).await.remove(0);

    Hero::new(Some(1), "Deadpond", "Dive Wilson", Some(20))
        .upsert(&mut session)
        .await
        .unwrap();
    let heroes = stored_heroes(&store).await;

    assert_eq!(heroes.len(), 1);
    assert_eq!(heroes[0].age, Some(20));
    assert_eq!(heroes[0].created_on, first.created_on);
    assert!(heroes[0].modified_on.unwrap() > first.modified_on.unwrap());
}

#[tokio::test]
async fn test_excluded_fields_survive_conflicts() {
    let account = RecordType::builder("account")
        .column(Column::new("email", DataType::Text).not_null())
        .column(Column::new("display_name", DataType::Text).not_null())
        .column(Column::new("signup_source", DataType::Text))
        .conflict_target(["email"])
        .exclude_from_update(["signup_source"])
        .build()
        .unwrap();
    let store = MemoryStore::new();
    store.create_table(&account).await.unwrap();
    let mut session = store.session();

    let first = Record::new(
        &account,
        [
            ("email", Value::from("wade@example.test")),
            ("display_name", "Wade".into()),
            ("signup_source", "newsletter".into()),
        ],
    )
    .unwrap();
    upsert_one(&first, &mut session).await.unwrap();

    let second = Record::new(
        &account,
        [
            ("email", Value::from("wade@example.test")),
            ("display_name", "Deadpond".into()),
            ("signup_source", "import".into()),
        ],
    )
    .unwrap();
    upsert_one(&second, &mut session).await.unwrap();

    let rows = store.fetch_all(&account).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("display_name"), Some(&Value::from("Deadpond")));
    assert_eq!(rows[0].get("signup_source"), Some(&Value::from("newsletter")));
}

#[tokio::test]
async fn test_missing_conflict_target_reaches_no_store() {
    let untargeted = RecordType::builder("sidekick")
        .column(Column::new("name", DataType::Text).not_null().unique())
        .build()
        .unwrap();
    let store = MemoryStore::new();
    store.create_table(&untargeted).await.unwrap();
    let mut session = store.session();

    let records: Vec<Record> = ["Robin", "Bucky"]
        .into_iter()
        .map(|name| Record::new(&untargeted, [("name", Value::from(name))]).unwrap())
        .collect();

    let err = upsert_many(&records, &mut session).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(!session.in_transaction());
    assert_eq!(store.row_count("sidekick").await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_with_duplicate_keys_applies_in_order() {
    let store = hero_store().await;
    let mut session = store.session();

    let batch = vec![
        Hero::new(Some(7), "Deadpond", "Dive Wilson", Some(30)),
        Hero::new(Some(7), "Deadpond", "Dive Wilson", Some(31)),
    ];
    Hero::batch_upsert(&batch, &mut session).await.unwrap();

    let heroes = stored_heroes(&store).await;
    assert_eq!(heroes.len(), 1);
    assert_eq!(heroes[0].age, Some(31));
}

#[tokio::test]
async fn test_dropped_session_discards_uncommitted_writes() {
    let store = hero_store().await;
    let mut session = store.session();

    Hero::new(Some(1), "Deadpond", "Dive Wilson", None)
        .upsert(&mut session)
        .await
        .unwrap();

    {
        let mut doomed = store.session();
        let record = Hero::new(Some(2), "Spider-Boy", "Pedro Parqueador", None)
            .to_record()
            .unwrap();
        doomed
            .execute(&upsert_statement(&record).unwrap())
            .await
            .unwrap();
        // dropped without commit
    }

    assert_eq!(store.row_count("hero").await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_model_is_rejected_before_the_store() {
    #[derive(Serialize, Deserialize)]
    struct LooseHero {
        id: Option<i64>,
        name: String,
        secret_name: String,
        age: DateTime<Utc>,
    }

    impl Model for LooseHero {
        fn record_type() -> Arc<RecordType> {
            HERO.clone()
        }
    }

    let store = hero_store().await;
    let mut session = store.session();

    let hero = LooseHero {
        id: None,
        name: "Deadpond".into(),
        secret_name: "Dive Wilson".into(),
        age: Utc::now(),
    };
    let err = hero.upsert(&mut session).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(store.row_count("hero").await.unwrap(), 0);
}
