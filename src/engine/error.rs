//! Errors of the archiver engine.

use thiserror::Error;

use crate::{persistence::PersistenceError, publisher::PublisherError};

/// Errors raised while flushing, sweeping or assembling an archiver.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The document store failed as a whole.
    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The message bus refused a publish.
    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),

    /// A record could not be turned into a document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An event store was not provided to the `ArchiverBuilder`.
    #[error("Missing event store for Archiver")]
    MissingStore,

    /// An event publisher was not provided to the `ArchiverBuilder`.
    #[error("Missing event publisher for Archiver")]
    MissingPublisher,
}
