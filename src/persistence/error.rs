//! Errors of the document store.

use thiserror::Error;

/// Errors raised by an `EventStore`. Rejections of single operations inside
/// a bulk write are reported through `BulkWriteReport` instead.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The store could not be reached or refused a whole operation.
    #[error("Store operation failed: {0}")]
    OperationFailed(String),

    /// A document could not be encoded or decoded.
    #[error("Document (de)serialization failed: {0}")]
    SerializationError(String),

    /// The schema could not be brought up to date.
    #[error("Schema migration failed: {0}")]
    MigrationError(String),

    /// The database URL or an argument was rejected.
    #[error("Invalid store input: {0}")]
    InvalidInput(String),
}
