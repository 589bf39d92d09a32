use thiserror::Error;

use crate::MessageId;

/// Errors raised by bus transports and subscribers.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport refused or failed to accept a message.
    #[error("Publish to topic {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The subscription was never bound to a topic.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// An ack, nack or dead-letter referred to a message not in flight.
    #[error("Message {0} is not in flight")]
    NotInFlight(MessageId),

    /// A handler rejected the message; it will be redelivered.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Wraps any handler failure.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
