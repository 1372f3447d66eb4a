//! An in-memory publisher for testing.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::publisher::{EventPublisher, PublisherError};

/// One message captured by a `RecordingPublisher`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Exchange the message was published on.
    pub exchange: String,
    /// Routing key of the message.
    pub routing_key: String,
    /// Decoded JSON payload.
    pub payload: Value,
}

/// An `EventPublisher` that keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl RecordingPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages published so far.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublisherError> {
        let payload = serde_json::from_slice(payload)?;
        self.messages.lock().unwrap().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        });
        Ok(())
    }
}
