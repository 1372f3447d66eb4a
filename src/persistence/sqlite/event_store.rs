//! Implementation of the EventStore trait for SqliteEventStore

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;

use super::{SqliteEventStore, decode_document, document_id};
use crate::{
    config::STATUS_CONFIG_NAME,
    models::{AlarmStatus, Document},
    persistence::{
        bulk::{BulkWriteReport, Collection, UpdateOperation},
        error::PersistenceError,
        traits::EventStore,
    },
};

/// SQL query constants for the current-state collection
mod events_sql {
    /// Select current-state documents whose id is in a JSON array
    pub const SELECT_BY_IDS: &str =
        "SELECT id, document FROM events WHERE id IN (SELECT value FROM json_each(?))";

    /// Select one current-state document
    pub const SELECT_BY_ID: &str = "SELECT document FROM events WHERE id = ?";

    /// Select current-state documents in a status
    pub const SELECT_BY_STATUS: &str = "SELECT id, document FROM events WHERE status = ?";

    /// Insert a new current-state document
    pub const INSERT: &str = "INSERT INTO events (id, status, document) VALUES (?, ?, ?)";

    /// Replace the document of an existing identity
    pub const UPDATE: &str = "UPDATE events SET status = ?, document = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?";

    /// Delete every current-state document
    pub const DELETE_ALL: &str = "DELETE FROM events";
}

/// SQL query constants for the history collection
mod events_log_sql {
    /// Insert a history entry
    pub const INSERT: &str =
        "INSERT INTO events_log (id, event_id, timestamp, document) VALUES (?, ?, ?, ?)";

    /// Select the history of one identity
    pub const SELECT_BY_EVENT_ID: &str =
        "SELECT id, document FROM events_log WHERE event_id = ? ORDER BY timestamp, id";

    /// Delete every history entry
    pub const DELETE_ALL: &str = "DELETE FROM events_log";
}

/// SQL query constants for configuration documents
mod config_sql {
    /// Select a configuration document by name
    pub const SELECT_BY_NAME: &str = "SELECT document FROM archiver_config WHERE name = ?";

    /// Insert or replace a configuration document
    pub const UPSERT: &str = "INSERT OR REPLACE INTO archiver_config (name, document, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)";
}

fn status_code(document: &Document) -> Option<i64> {
    document.get("status").and_then(Value::as_i64)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()), level = "debug")]
    async fn find_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Document>, PersistenceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_list = serde_json::to_string(ids)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        let rows = self
            .run(
                "find events by ids",
                sqlx::query(events_sql::SELECT_BY_IDS).bind(id_list).fetch_all(&self.pool),
            )
            .await?;

        let mut documents = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let text: String = row.get("document");
            // An empty document never decodes as a record, so the caller
            // treats the identity as malformed rather than unseen.
            let document = decode_document(&id, &text).unwrap_or_default();
            documents.insert(id, document);
        }
        tracing::debug!(found = documents.len(), "Fetched previous event documents.");
        Ok(documents)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_one(&self, id: &str) -> Result<Option<Document>, PersistenceError> {
        let row = self
            .run(
                "find event",
                sqlx::query(events_sql::SELECT_BY_ID).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.and_then(|row| {
            let text: String = row.get("document");
            decode_document(id, &text)
        }))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_by_status(
        &self,
        status: AlarmStatus,
    ) -> Result<Vec<Document>, PersistenceError> {
        let rows = self
            .run(
                "find events by status",
                sqlx::query(events_sql::SELECT_BY_STATUS)
                    .bind(i64::from(status.code()))
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id: String = row.get("id");
                let text: String = row.get("document");
                decode_document(&id, &text)
            })
            .collect())
    }

    #[tracing::instrument(skip(self, documents), fields(count = documents.len()), level = "debug")]
    async fn insert_many(
        &self,
        collection: Collection,
        documents: Vec<Document>,
    ) -> Result<BulkWriteReport, PersistenceError> {
        let mut report = BulkWriteReport::new(collection, documents.len());
        if documents.is_empty() {
            return Ok(report);
        }

        let mut tx = self
            .run("begin bulk insert", self.pool.begin())
            .await?;

        for (index, document) in documents.iter().enumerate() {
            let Some(id) = document_id(document) else {
                report.fail(index, None, "document has no _id");
                continue;
            };
            let body = match serde_json::to_string(document) {
                Ok(body) => body,
                Err(e) => {
                    report.fail(index, Some(id), e.to_string());
                    continue;
                }
            };

            let result = match collection {
                Collection::Events => {
                    sqlx::query(events_sql::INSERT)
                        .bind(id)
                        .bind(status_code(document))
                        .bind(&body)
                        .execute(&mut *tx)
                        .await
                }
                Collection::EventsLog => {
                    sqlx::query(events_log_sql::INSERT)
                        .bind(id)
                        .bind(document.get("event_id").and_then(Value::as_str))
                        .bind(document.get("timestamp").and_then(Value::as_i64))
                        .bind(&body)
                        .execute(&mut *tx)
                        .await
                }
            };

            match result {
                Ok(_) => report.written += 1,
                Err(e) => report.fail(index, Some(id), e.to_string()),
            }
        }

        self.run("commit bulk insert", tx.commit()).await?;
        Ok(report)
    }

    #[tracing::instrument(skip(self, operations), fields(count = operations.len()), level = "debug")]
    async fn update_many(
        &self,
        operations: Vec<UpdateOperation>,
    ) -> Result<BulkWriteReport, PersistenceError> {
        let mut report = BulkWriteReport::new(Collection::Events, operations.len());
        if operations.is_empty() {
            return Ok(report);
        }

        let mut tx = self
            .run("begin bulk update", self.pool.begin())
            .await?;

        for (index, operation) in operations.iter().enumerate() {
            let id = operation.id.as_str();
            let row = match sqlx::query(events_sql::SELECT_BY_ID)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
            {
                Ok(Some(row)) => row,
                Ok(None) => {
                    report.unmatched += 1;
                    continue;
                }
                Err(e) => {
                    report.fail(index, Some(id), e.to_string());
                    continue;
                }
            };

            let text: String = row.get("document");
            let mut document = match serde_json::from_str::<Document>(&text) {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!(id, error = %e, "Overwriting undecodable stored document.");
                    Document::new()
                }
            };
            for (key, value) in &operation.changes {
                document.insert(key.clone(), value.clone());
            }
            let body = match serde_json::to_string(&document) {
                Ok(body) => body,
                Err(e) => {
                    report.fail(index, Some(id), e.to_string());
                    continue;
                }
            };

            match sqlx::query(events_sql::UPDATE)
                .bind(status_code(&document))
                .bind(&body)
                .bind(id)
                .execute(&mut *tx)
                .await
            {
                Ok(_) => report.written += 1,
                Err(e) => report.fail(index, Some(id), e.to_string()),
            }
        }

        self.run("commit bulk update", tx.commit()).await?;
        Ok(report)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_history(&self, event_id: &str) -> Result<Vec<Document>, PersistenceError> {
        let rows = self
            .run(
                "find history",
                sqlx::query(events_log_sql::SELECT_BY_EVENT_ID).bind(event_id).fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id: String = row.get("id");
                let text: String = row.get("document");
                decode_document(&id, &text)
            })
            .collect())
    }

    async fn get_status_config(&self) -> Result<Option<Document>, PersistenceError> {
        let row = self
            .run(
                "get status config",
                sqlx::query(config_sql::SELECT_BY_NAME)
                    .bind(STATUS_CONFIG_NAME)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => {
                let text: String = row.get("document");
                serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| PersistenceError::SerializationError(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn set_status_config(&self, document: &Document) -> Result<(), PersistenceError> {
        let body = serde_json::to_string(document)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        self.run(
            "set status config",
            sqlx::query(config_sql::UPSERT).bind(STATUS_CONFIG_NAME).bind(body).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "info")]
    async fn drop_all(&self) -> Result<(), PersistenceError> {
        let mut tx =
            self.run("begin drop all", self.pool.begin()).await?;
        self.run(
            "drop events",
            sqlx::query(events_sql::DELETE_ALL).execute(&mut *tx),
        )
        .await?;
        self.run(
            "drop events log",
            sqlx::query(events_log_sql::DELETE_ALL).execute(&mut *tx),
        )
        .await?;
        self.run("commit drop all", tx.commit()).await?;
        tracing::info!("Removed all current-state documents and history entries.");
        Ok(())
    }
}
