//! Integration tests for the persistence layer

use archiver::{
    models::{AlarmStatus, Document},
    persistence::{Collection, EventStore, SqliteEventStore, UpdateOperation},
};
use serde_json::json;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteEventStore {
    let url = format!("sqlite://{}", dir.path().join("archiver.db").display());
    let store = SqliteEventStore::new(&url).await.expect("Failed to open database file");
    store.run_migrations().await.expect("Failed to run migrations");
    store
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("test documents are objects")
}

#[tokio::test]
async fn test_records_survive_reopening_the_database() {
    let dir = TempDir::new().unwrap();

    let store = open(&dir).await;
    store
        .insert_many(
            Collection::Events,
            vec![doc(json!({"_id": "a", "state": 2, "state_type": 1, "status": 2}))],
        )
        .await
        .unwrap();
    store
        .insert_many(
            Collection::EventsLog,
            vec![doc(json!({"_id": "a.1.000000", "event_id": "a", "timestamp": 1, "state": 2}))],
        )
        .await
        .unwrap();
    store.set_status_config(&doc(json!({"stealthy_show": 60}))).await.unwrap();
    store.close().await;

    // Migrations are idempotent on an existing database.
    let store = open(&dir).await;
    let record = store.find_one("a").await.unwrap().unwrap();
    assert_eq!(record.get("state"), Some(&json!(2)));
    assert_eq!(store.find_by_status(AlarmStatus::Stealthy).await.unwrap().len(), 1);
    assert_eq!(store.find_history("a").await.unwrap().len(), 1);
    assert_eq!(
        store.get_status_config().await.unwrap().and_then(|c| c.get("stealthy_show").cloned()),
        Some(json!(60))
    );
}

#[tokio::test]
async fn test_history_is_ordered_by_event_timestamp() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let entries = vec![
        doc(json!({"_id": "a.30.000000", "event_id": "a", "timestamp": 30})),
        doc(json!({"_id": "a.10.000000", "event_id": "a", "timestamp": 10})),
        doc(json!({"_id": "a.20.000000", "event_id": "a", "timestamp": 20})),
    ];
    store.insert_many(Collection::EventsLog, entries).await.unwrap();

    let ids: Vec<_> = store
        .find_history("a")
        .await
        .unwrap()
        .iter()
        .map(|entry| entry.get("_id").cloned())
        .collect();
    assert_eq!(
        ids,
        vec![Some(json!("a.10.000000")), Some(json!("a.20.000000")), Some(json!("a.30.000000"))]
    );
}

#[tokio::test]
async fn test_history_ids_are_unique() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let entry = doc(json!({"_id": "a.10.000000", "event_id": "a", "timestamp": 10}));
    let report =
        store.insert_many(Collection::EventsLog, vec![entry.clone(), entry]).await.unwrap();

    assert_eq!(report.written, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
}

#[tokio::test]
async fn test_status_index_follows_updates() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_many(
            Collection::Events,
            vec![
                doc(json!({"_id": "a", "state": 0, "status": 2, "ts_first_stealthy": 5})),
                doc(json!({"_id": "b", "state": 1, "status": 2, "ts_first_stealthy": 5})),
            ],
        )
        .await
        .unwrap();

    let report = store
        .update_many(vec![UpdateOperation {
            id: "a".to_string(),
            changes: doc(json!({"status": 0, "ts_first_stealthy": 0})),
        }])
        .await
        .unwrap();
    assert_eq!(report.written, 1);

    let stealthy = store.find_by_status(AlarmStatus::Stealthy).await.unwrap();
    assert_eq!(stealthy.len(), 1);
    assert_eq!(stealthy[0].get("_id"), Some(&json!("b")));
    assert_eq!(store.find_by_status(AlarmStatus::Off).await.unwrap().len(), 1);
}
