//! Message bus contracts for the trade saga.
//!
//! - [`Publisher`] sends a serialized event to a named topic.
//! - [`MessageSource`] is the transport a [`Subscriber`] pulls deliveries from.
//! - [`Subscriber`] binds one subscription to a typed payload and a handler
//!   and runs a cancellable receive loop with bounded redelivery.
//!
//! [`InMemoryBus`] implements both transport sides with at-least-once
//! semantics and is used by tests and single-process deployments.

pub mod error;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod subscriber;

pub use error::{BusError, Result};
pub use memory::{DEFAULT_HISTORY_LIMIT, InMemoryBus};
pub use message::{Delivery, Message, MessageId};
pub use publisher::{BusEvent, Publisher, PublisherExt};
pub use subscriber::{
    DEFAULT_MAX_RETRIES, DeliveryOutcome, MessageHandler, MessageSource, Subscriber,
    SubscriptionConfig,
};
