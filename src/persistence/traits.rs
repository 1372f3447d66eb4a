//! This module defines the document-store boundary of the archiver.

use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::{
    bulk::{BulkWriteReport, Collection, UpdateOperation},
    error::PersistenceError,
};
use crate::models::{AlarmStatus, Document};

/// Storage of current-state records, the history log and the status
/// configuration document.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetches the current-state documents of the given identities, keyed by
    /// identity. Identities without a document are absent from the map.
    async fn find_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Document>, PersistenceError>;

    /// Fetches the current-state document of one identity.
    async fn find_one(&self, id: &str) -> Result<Option<Document>, PersistenceError>;

    /// Fetches every current-state document in the given status.
    async fn find_by_status(&self, status: AlarmStatus)
    -> Result<Vec<Document>, PersistenceError>;

    /// Inserts documents in order. Each document must carry an `_id`.
    async fn insert_many(
        &self,
        collection: Collection,
        documents: Vec<Document>,
    ) -> Result<BulkWriteReport, PersistenceError>;

    /// Applies field change-sets to current-state documents, in order.
    async fn update_many(
        &self,
        operations: Vec<UpdateOperation>,
    ) -> Result<BulkWriteReport, PersistenceError>;

    /// Fetches the history entries logged for one identity, oldest first.
    async fn find_history(&self, event_id: &str) -> Result<Vec<Document>, PersistenceError>;

    /// Fetches the status-management configuration document.
    async fn get_status_config(&self) -> Result<Option<Document>, PersistenceError>;

    /// Stores the status-management configuration document.
    async fn set_status_config(&self, document: &Document) -> Result<(), PersistenceError>;

    /// Removes every current-state document and history entry.
    async fn drop_all(&self) -> Result<(), PersistenceError>;
}
