/// Error types for event publishers.
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// RabbitMQ error
    #[error("RabbitMQ error: {0}")]
    Lapin(#[from] lapin::Error),

    /// The document could not be encoded as JSON.
    #[error("Failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),
}
