#[cfg(test)]
use mockall::automock;

use super::PublisherError;

/// A trait representing an event publisher that can publish events back to
/// the message bus.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `payload` on `exchange` under `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublisherError>;
}
