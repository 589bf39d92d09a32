use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Message, MessageId, Result};

/// Sends messages to named topics.
///
/// A failed publish is reported to the caller and never retried here;
/// retrying is the caller's policy.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a message and returns its id.
    async fn publish(&self, message: Message) -> Result<MessageId>;
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<MessageId> {
        (**self).publish(message).await
    }
}

/// An event that can be published on the bus.
pub trait BusEvent: Serialize + Send + Sync {
    /// Key identifying what this event is about, used to detect duplicates.
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}

/// Extension methods for publishers.
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Serializes `event` and publishes it to `topic`.
    async fn publish_event<E: BusEvent>(&self, topic: &str, event: &E) -> Result<MessageId> {
        let mut message = Message::new(topic, serde_json::to_value(event)?);
        if let Some(key) = event.idempotency_key() {
            message = message.with_idempotency_key(key);
        }
        self.publish(message).await
    }
}

// Blanket implementation
impl<T: Publisher + ?Sized> PublisherExt for T {}
