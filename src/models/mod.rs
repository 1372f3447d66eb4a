//! This module contains the data models of the archiver.

pub mod event;
pub mod record;
pub mod routing;
pub mod status;
pub mod window;

pub use event::{Document, Event};
pub use record::{AlarmRecord, HistoryEntry, Lifecycle};
pub use status::AlarmStatus;
pub use window::{BagotWindow, StealthyWindow};
