//! The archiver engine: lifecycle decisions, change-sets, buffering, batched
//! persistence and the expiry sweep.

pub mod archiver;
pub mod builder;
pub mod diff;
pub mod error;
pub mod ingest_buffer;
pub mod persister;
pub mod state_machine;
pub mod sweeper;

pub use archiver::{Archiver, ArchiverStats, TickReport};
pub use builder::ArchiverBuilder;
pub use diff::{CurrentStateWrite, DiffEngine, Evaluation, PreviousState};
pub use error::ArchiverError;
pub use ingest_buffer::IngestBuffer;
pub use persister::{BatchPersister, FlushReport};
pub use state_machine::StateMachine;
pub use sweeper::{ExpirySweeper, SweepReport};
