//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use lapin::Channel;

use super::{Supervisor, SupervisorError};
use crate::{config::AppConfig, engine::Archiver, persistence::EventStore};

/// A builder for creating a `Supervisor` instance.
pub struct SupervisorBuilder<S: EventStore + ?Sized> {
    config: Option<AppConfig>,
    archiver: Option<Archiver<S>>,
    channel: Option<Channel>,
}

impl<S: EventStore + ?Sized> Default for SupervisorBuilder<S> {
    fn default() -> Self {
        Self { config: None, archiver: None, channel: None }
    }
}

impl<S: EventStore + ?Sized> SupervisorBuilder<S> {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the archiver fed by the `Supervisor`.
    pub fn archiver(mut self, archiver: Archiver<S>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    /// Sets the channel events are consumed from.
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Ensures all required dependencies have been provided and constructs
    /// the `Supervisor`.
    pub fn build(self) -> Result<Supervisor<S>, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let archiver = self.archiver.ok_or(SupervisorError::MissingArchiver)?;
        let channel = self.channel.ok_or(SupervisorError::MissingChannel)?;

        Ok(Supervisor::new(config, archiver, channel))
    }
}
