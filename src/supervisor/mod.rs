//! The Supervisor module hosts the archiver.
//!
//! It consumes events from the message bus and hands them to the archiver,
//! drives the archiver tick on a fixed interval and shuts down gracefully on
//! `SIGINT`/`SIGTERM`, flushing whatever is still buffered.
//!
//! Deliveries and ticks are handled from a single `select!` loop, so calls
//! into the archiver never overlap.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use futures::StreamExt;
use lapin::{
    Channel,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicRejectOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use thiserror::Error;
use tokio::{signal, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    engine::{Archiver, ArchiverError},
    models::Event,
    persistence::{EventStore, PersistenceError},
    publisher::PublisherError,
};

const CONSUMER_TAG: &str = "archiver";

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// An archiver was not provided to the `SupervisorBuilder`.
    #[error("Missing archiver for Supervisor")]
    MissingArchiver,

    /// A bus channel was not provided to the `SupervisorBuilder`.
    #[error("Missing message bus channel for Supervisor")]
    MissingChannel,

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The message bus failed.
    #[error("Message bus error: {0}")]
    Bus(#[from] lapin::Error),

    /// The archiver could not be assembled.
    #[error("Archiver error: {0}")]
    Archiver(#[from] ArchiverError),

    /// The store could not be opened or migrated.
    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The publisher could not be created.
    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),
}

/// The runtime host of one archiver instance.
pub struct Supervisor<S: EventStore + ?Sized> {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The archiver fed by this supervisor.
    archiver: Archiver<S>,

    /// The channel events are consumed from.
    channel: Channel,

    /// A token used to signal a graceful shutdown.
    cancellation_token: CancellationToken,
}

impl<S: EventStore + ?Sized> Supervisor<S> {
    /// Creates a new Supervisor. Prefer [`Supervisor::builder`].
    pub fn new(config: AppConfig, archiver: Archiver<S>, channel: Channel) -> Self {
        Self {
            config: Arc::new(config),
            archiver,
            channel,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder<S> {
        SupervisorBuilder::new()
    }

    /// A token that stops [`Supervisor::run`] when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Runs until a shutdown signal is received or the consumer stops.
    ///
    /// 1. Spawns a signal handler for `SIGINT` (Ctrl+C) and `SIGTERM`.
    /// 2. Declares and binds the queue, then starts consuming.
    /// 3. Loops over deliveries and ticks.
    /// 4. Flushes the buffer before returning.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();
        let signal_handler = tokio::spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to register SIGTERM handler.");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
                _ = cancellation_token.cancelled() => {}
            }
            cancellation_token.cancel();
        });

        let amqp = &self.config.amqp;
        self.channel
            .queue_declare(
                &amqp.queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        self.channel
            .queue_bind(
                &amqp.queue,
                &amqp.exchange,
                &amqp.binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        let mut consumer = self
            .channel
            .basic_consume(
                &amqp.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!(queue = %amqp.queue, exchange = %amqp.exchange, "Consuming events.");

        let mut ticker = tokio::time::interval(self.config.archiver.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = self.cancellation_token.clone();
        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    self.archiver.on_tick().await;
                }
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Consumer failed, shutting down.");
                        break Err(SupervisorError::Bus(e));
                    }
                    None => {
                        tracing::warn!("Consumer stream ended, shutting down.");
                        break Ok(());
                    }
                },
            }
        };

        self.cancellation_token.cancel();
        let _ = signal_handler.await;

        tracing::info!(buffered = self.archiver.buffered(), "Flushing buffered events.");
        self.archiver.flush().await;
        tracing::info!("Supervisor shutdown complete.");
        result
    }

    /// Decodes one delivery and feeds it to the archiver. Undecodable
    /// deliveries are rejected without requeue.
    async fn handle_delivery(&mut self, delivery: Delivery) {
        let event = match serde_json::from_slice::<Event>(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "Rejecting undecodable event."
                );
                if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                    tracing::error!(error = %e, "Failed to reject delivery.");
                }
                return;
            }
        };

        let id = event.identity().unwrap_or_else(|| delivery.routing_key.to_string());
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            tracing::error!(id = %id, error = %e, "Failed to acknowledge delivery.");
        }
        self.archiver.on_event(id, event).await;
    }
}
