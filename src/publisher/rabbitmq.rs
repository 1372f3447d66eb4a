//! RabbitMQ implementation of [`EventPublisher`].

use lapin::{
    BasicProperties, Channel, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::{FieldTable, ShortString},
};

use crate::publisher::{EventPublisher, PublisherError};

/// AMQP delivery mode of persistent messages.
const PERSISTENT: u8 = 2;

/// Publishes JSON documents on a RabbitMQ topic exchange.
pub struct RabbitMqEventPublisher {
    channel: Channel,
}

impl RabbitMqEventPublisher {
    /// Wraps an open channel, declaring `exchange` (topic, durable) on it.
    pub async fn from_channel(channel: Channel, exchange: &str) -> Result<Self, PublisherError> {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        tracing::debug!(exchange, "Exchange declared.");

        Ok(Self { channel })
    }
}

#[async_trait::async_trait]
impl EventPublisher for RabbitMqEventPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublisherError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT);

        let confirm = self
            .channel
            .basic_publish(exchange, routing_key, BasicPublishOptions::default(), payload, properties)
            .await?;
        confirm.await?;
        tracing::debug!(exchange, routing_key, bytes = payload.len(), "Event published.");
        Ok(())
    }
}
