//! Configuration module for the archiver.

mod app_config;
mod helpers;
mod status;

pub use app_config::{AmqpConfig, AppConfig, ArchiverSettings};
pub use helpers::{deserialize_duration_from_ms, deserialize_duration_from_seconds};
pub use status::{STATUS_CONFIG_NAME, StatusConfig};
