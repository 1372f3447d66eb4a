//! A set of helpers for testing

mod event;
mod publisher;
mod record;
mod time;

pub use event::EventBuilder;
pub use publisher::{PublishedMessage, RecordingPublisher};
pub use record::AlarmRecordBuilder;
pub use time::ManualTimeSource;
