//! Operation and result types of bulk writes.

use std::fmt;

use crate::models::Document;

/// The two collections the archiver writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// One mutable document per identity.
    Events,
    /// Append-only snapshots of state transitions.
    EventsLog,
}

impl Collection {
    /// The table backing the collection.
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::EventsLog => "events_log",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Sets `changes` on the current-state document identified by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    /// Identity of the document to update.
    pub id: String,
    /// Fields to set, overwriting existing values.
    pub changes: Document,
}

/// One operation rejected by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteFailure {
    /// Position of the operation in the submitted batch.
    pub index: usize,
    /// Identity targeted by the operation, when it had one.
    pub id: Option<String>,
    /// Why the store rejected it.
    pub reason: String,
}

/// Outcome of one bulk operation. Rejected operations do not prevent the
/// others from being committed.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteReport {
    /// Collection the batch was written to.
    pub collection: Collection,
    /// Operations submitted.
    pub attempted: usize,
    /// Operations committed.
    pub written: usize,
    /// Updates whose target document does not exist.
    pub unmatched: usize,
    /// Rejected operations.
    pub failures: Vec<BulkWriteFailure>,
}

impl BulkWriteReport {
    /// An empty report for a batch of `attempted` operations.
    pub fn new(collection: Collection, attempted: usize) -> Self {
        Self { collection, attempted, written: 0, unmatched: 0, failures: Vec::new() }
    }

    /// Records a rejected operation.
    pub fn fail(&mut self, index: usize, id: Option<&str>, reason: impl Into<String>) {
        self.failures.push(BulkWriteFailure {
            index,
            id: id.map(str::to_string),
            reason: reason.into(),
        });
    }

    /// Whether at least one operation was rejected.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
