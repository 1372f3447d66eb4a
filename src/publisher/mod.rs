//! Publishing of events back to the message bus.

mod error;
mod rabbitmq;
mod traits;

pub use error::PublisherError;
pub use rabbitmq::RabbitMqEventPublisher;
#[cfg(test)]
pub use traits::MockEventPublisher;
pub use traits::EventPublisher;
