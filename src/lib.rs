#![warn(missing_docs)]
//! Archiver is the stateful core of an event-correlation engine: it reduces a
//! stream of monitoring check events to one alarm lifecycle per identity,
//! debounced against flapping and noisy sources, and keeps an append-only
//! history of state transitions.

pub mod config;
pub mod engine;
pub mod models;
pub mod persistence;
pub mod publisher;
pub mod supervisor;
pub mod test_helpers;
pub mod time_source;
