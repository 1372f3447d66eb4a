//! This module provides the `ArchiverBuilder` for constructing an `Archiver`.

use std::sync::Arc;

use super::{
    archiver::Archiver, error::ArchiverError, ingest_buffer::IngestBuffer,
    state_machine::StateMachine, sweeper::ExpirySweeper,
};
use crate::{
    config::{ArchiverSettings, StatusConfig},
    persistence::EventStore,
    publisher::EventPublisher,
    time_source::{SystemTimeSource, TimeSource},
};

const DEFAULT_EXCHANGE: &str = "canopsis.events";

/// A builder for creating an `Archiver` instance.
pub struct ArchiverBuilder<S: EventStore + ?Sized> {
    store: Option<Arc<S>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    time_source: Option<Arc<dyn TimeSource>>,
    settings: ArchiverSettings,
    status: StatusConfig,
    exchange: String,
}

impl<S: EventStore + ?Sized> Default for ArchiverBuilder<S> {
    fn default() -> Self {
        Self {
            store: None,
            publisher: None,
            time_source: None,
            settings: ArchiverSettings::default(),
            status: StatusConfig::default(),
            exchange: DEFAULT_EXCHANGE.to_string(),
        }
    }
}

impl<S: EventStore + ?Sized> ArchiverBuilder<S> {
    /// Creates a new, empty `ArchiverBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document store holding current-state records and history.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the publisher used to re-publish resolved stealthy records.
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Sets the clock. Defaults to the system clock.
    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Sets the batching and configuration refresh settings.
    pub fn settings(mut self, settings: ArchiverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the status thresholds used until the stored configuration is
    /// read.
    pub fn status_config(mut self, status: StatusConfig) -> Self {
        self.status = status;
        self
    }

    /// Sets the exchange resolved records are published on.
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Assembles the archiver, failing when a store or publisher is missing.
    pub fn build(self) -> Result<Archiver<S>, ArchiverError> {
        let store = self.store.ok_or(ArchiverError::MissingStore)?;
        let publisher = self.publisher.ok_or(ArchiverError::MissingPublisher)?;
        let time_source = self.time_source.unwrap_or_else(|| Arc::new(SystemTimeSource));

        let buffer = IngestBuffer::new(
            self.settings.bulk_amount,
            self.settings.bulk_delay,
            time_source.now(),
        );
        let sweeper = ExpirySweeper::new(self.exchange, self.settings.config_refresh);

        tracing::debug!(
            bulk_amount = self.settings.bulk_amount,
            bulk_delay = ?self.settings.bulk_delay,
            config_refresh = ?self.settings.config_refresh,
            "Archiver assembled."
        );
        Ok(Archiver::new(
            store,
            publisher,
            time_source,
            StateMachine::new(self.status),
            buffer,
            sweeper,
        ))
    }
}
