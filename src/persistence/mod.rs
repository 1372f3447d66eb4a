//! This module contains the storage boundary of the archiver.

pub mod bulk;
pub mod error;
pub mod sqlite;
pub mod traits;

pub use bulk::{BulkWriteFailure, BulkWriteReport, Collection, UpdateOperation};
pub use error::PersistenceError;
pub use sqlite::SqliteEventStore;
pub use traits::EventStore;
