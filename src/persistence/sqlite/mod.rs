//! This module provides a concrete implementation of the EventStore using
//! SQLite.

use std::{str::FromStr, time::Duration};

use serde_json::Value;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

pub mod event_store;

use crate::{models::Document, persistence::error::PersistenceError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// An `EventStore` backed by SQLite. Each document is stored as JSON text
/// next to the columns it is looked up by (`id`, `status`, `event_id`).
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Opens the database at `database_url`, creating the file when needed.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            PersistenceError::OperationFailed(format!("cannot open {database_url}: {e}"))
        })?;
        tracing::info!(database_url, "Event store opened.");
        Ok(Self { pool })
    }

    /// Creates or upgrades the `events`, `events_log` and `archiver_config`
    /// tables.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Event store migration failed.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::debug!("Event store schema is up to date.");
        Ok(())
    }

    /// Waits for in-flight queries and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Event store closed.");
    }

    /// Awaits `query`, logging and wrapping a failure as `OperationFailed`.
    async fn run<T, E>(
        &self,
        operation: &str,
        query: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PersistenceError>
    where
        E: std::error::Error,
    {
        query.await.map_err(|e| {
            tracing::error!(error = %e, operation, "Event store query failed.");
            PersistenceError::OperationFailed(format!("{operation}: {e}"))
        })
    }
}

/// Parses a stored JSON document. Undecodable rows are logged.
fn decode_document(key: &str, text: &str) -> Option<Document> {
    match serde_json::from_str::<Document>(text) {
        Ok(document) => Some(document),
        Err(e) => {
            tracing::error!(key, error = %e, "Failed to decode stored document.");
            None
        }
    }
}

/// Reads the `_id` of a document.
fn document_id(document: &Document) -> Option<&str> {
    document.get("_id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;
    use crate::{
        models::AlarmStatus,
        persistence::{
            bulk::{Collection, UpdateOperation},
            traits::EventStore,
        },
    };

    async fn setup_test_db() -> SqliteEventStore {
        let store = SqliteEventStore::new("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory db");
        store.run_migrations().await.expect("Failed to run migrations");
        store
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("test documents are objects")
    }

    #[tokio::test]
    async fn test_insert_and_find_by_ids() {
        let store = setup_test_db().await;
        let documents = vec![
            doc(json!({"_id": "a", "state": 1, "state_type": 1, "status": 1})),
            doc(json!({"_id": "b", "state": 0, "state_type": 1, "status": 0})),
        ];

        let report = store.insert_many(Collection::Events, documents).await.unwrap();
        assert_eq!(report.written, 2);
        assert!(!report.has_failures());

        let found = store
            .find_by_ids(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"].get("state"), Some(&json!(1)));
        assert!(!found.contains_key("missing"));
    }

    async fn seed_undecodable(store: &SqliteEventStore, id: &str) {
        sqlx::query("INSERT INTO events (id, status, document) VALUES (?, 1, 'not json')")
            .bind(id)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_row_is_found_as_empty_document() {
        let store = setup_test_db().await;
        seed_undecodable(&store, "x").await;

        let found = store.find_by_ids(&["x".to_string()]).await.unwrap();
        assert_eq!(found.get("x"), Some(&Document::new()));

        let report = store
            .update_many(vec![UpdateOperation {
                id: "x".to_string(),
                changes: doc(json!({"_id": "x", "state": 2, "status": 1})),
            }])
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert!(!report.has_failures());
        assert_eq!(
            store.find_one("x").await.unwrap(),
            Some(doc(json!({"_id": "x", "state": 2, "status": 1})))
        );
    }

    #[tokio::test]
    async fn test_undecodable_row_is_recovered_by_the_next_event() {
        use std::sync::Arc;

        use chrono::{TimeZone, Utc};

        use crate::{
            config::ArchiverSettings,
            engine::Archiver,
            test_helpers::{EventBuilder, ManualTimeSource, RecordingPublisher},
        };

        let store = setup_test_db().await;
        seed_undecodable(&store, "x").await;
        let store = Arc::new(store);

        let mut archiver = Archiver::builder()
            .store(Arc::clone(&store))
            .publisher(Arc::new(RecordingPublisher::new()))
            .time_source(Arc::new(ManualTimeSource::new(Utc.timestamp_opt(1_000, 0).unwrap())))
            .settings(ArchiverSettings { bulk_amount: 1, ..ArchiverSettings::default() })
            .build()
            .unwrap();

        let event = EventBuilder::new().rk("x").state(2).timestamp(1_000).build();
        let report = archiver.on_event("x".into(), event).await.unwrap();

        assert_eq!(report.anomalies, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.logged, 1);

        let record = store.find_one("x").await.unwrap().unwrap();
        assert_eq!(record.get("state"), Some(&json!(2)));
        assert_eq!(record.get("status"), Some(&json!(AlarmStatus::Ongoing.code())));
    }

    #[tokio::test]
    async fn test_find_by_ids_with_no_ids() {
        let store = setup_test_db().await;
        let found = store.find_by_ids(&[]).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_a_partial_failure() {
        let store = setup_test_db().await;
        store
            .insert_many(Collection::Events, vec![doc(json!({"_id": "a", "state": 1}))])
            .await
            .unwrap();

        let report = store
            .insert_many(
                Collection::Events,
                vec![
                    doc(json!({"_id": "a", "state": 2})),
                    doc(json!({"state": 2})),
                    doc(json!({"_id": "c", "state": 2})),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.written, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[0].id.as_deref(), Some("a"));
        assert_eq!(report.failures[1].index, 1);
        assert!(report.failures[1].id.is_none());

        // The rejected insert left the original document untouched.
        let original = store.find_one("a").await.unwrap().unwrap();
        assert_eq!(original.get("state"), Some(&json!(1)));
        assert!(store.find_one("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_merges_fields_and_reindexes_status() {
        let store = setup_test_db().await;
        store
            .insert_many(
                Collection::Events,
                vec![doc(json!({"_id": "a", "state": 1, "status": 2, "output": "warn"}))],
            )
            .await
            .unwrap();

        let report = store
            .update_many(vec![
                UpdateOperation {
                    id: "a".to_string(),
                    changes: doc(json!({"status": 1, "ticket": null})),
                },
                UpdateOperation { id: "ghost".to_string(), changes: doc(json!({"status": 0})) },
            ])
            .await
            .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.unmatched, 1);
        assert!(!report.has_failures());

        let updated = store.find_one("a").await.unwrap().unwrap();
        assert_eq!(updated.get("status"), Some(&json!(1)));
        assert_eq!(updated.get("output"), Some(&json!("warn")));
        assert_eq!(updated.get("ticket"), Some(&json!(null)));

        assert!(store.find_by_status(AlarmStatus::Stealthy).await.unwrap().is_empty());
        assert_eq!(store.find_by_status(AlarmStatus::Ongoing).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_returned_per_identity() {
        let store = setup_test_db().await;
        let entries = vec![
            doc(json!({"_id": "a.10.000000", "event_id": "a", "timestamp": 10})),
            doc(json!({"_id": "b.11.000000", "event_id": "b", "timestamp": 11})),
            doc(json!({"_id": "a.12.000000", "event_id": "a", "timestamp": 12})),
        ];
        let report = store.insert_many(Collection::EventsLog, entries).await.unwrap();
        assert_eq!(report.written, 3);

        let history = store.find_history("a").await.unwrap();
        let ids: HashSet<_> =
            history.iter().map(|d| d.get("_id").unwrap().as_str().unwrap().to_string()).collect();
        assert_eq!(ids, HashSet::from(["a.10.000000".to_string(), "a.12.000000".to_string()]));
        assert_eq!(history[0].get("timestamp"), Some(&json!(10)));
    }

    #[tokio::test]
    async fn test_history_entry_without_event_id_is_rejected() {
        let store = setup_test_db().await;
        let report = store
            .insert_many(Collection::EventsLog, vec![doc(json!({"_id": "a.1.000000"}))])
            .await
            .unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_status_config_round_trip() {
        let store = setup_test_db().await;
        assert!(store.get_status_config().await.unwrap().is_none());

        store.set_status_config(&doc(json!({"bagot_freq": 3}))).await.unwrap();
        store.set_status_config(&doc(json!({"bagot_freq": 4}))).await.unwrap();

        let config = store.get_status_config().await.unwrap().unwrap();
        assert_eq!(config.get("bagot_freq"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_drop_all() {
        let store = setup_test_db().await;
        store.insert_many(Collection::Events, vec![doc(json!({"_id": "a"}))]).await.unwrap();
        store
            .insert_many(
                Collection::EventsLog,
                vec![doc(json!({"_id": "a.1.000000", "event_id": "a"}))],
            )
            .await
            .unwrap();

        store.drop_all().await.unwrap();

        assert!(store.find_one("a").await.unwrap().is_none());
        assert!(store.find_history("a").await.unwrap().is_empty());
    }
}
