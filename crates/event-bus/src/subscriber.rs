use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{Delivery, MessageId, Result};

/// Redelivery limit used when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Transport side of a subscription.
///
/// Every received delivery must eventually be settled with exactly one of
/// `ack`, `nack` or `dead_letter`.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Binds a durable subscription to a topic. Binding twice is a no-op.
    async fn subscribe(&self, topic: &str, subscription: &str) -> Result<()>;

    /// Waits up to `wait` for the next delivery.
    ///
    /// Returns `None` when nothing arrived in time. Dropping the future
    /// before it resolves must not lose a message.
    async fn receive(&self, subscription: &str, wait: Duration) -> Result<Option<Delivery>>;

    /// Marks a delivery as processed.
    async fn ack(&self, subscription: &str, id: MessageId) -> Result<()>;

    /// Makes a delivery available again.
    async fn nack(&self, subscription: &str, id: MessageId) -> Result<()>;

    /// Gives up on a delivery.
    async fn dead_letter(&self, subscription: &str, id: MessageId, reason: &str) -> Result<()>;
}

/// Processes decoded payloads of one subscription.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    type Error: std::fmt::Display + Send;

    /// Handles one payload. An error asks for redelivery.
    async fn handle(&self, payload: T) -> std::result::Result<(), Self::Error>;
}

/// Where a subscription listens and how hard it retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub topic: String,
    pub subscription_id: String,

    /// Delivery attempts before a failing message is dead-lettered.
    pub max_retries: u32,

    /// How long one `receive` call waits before the loop checks for shutdown.
    pub poll_interval: Duration,

    /// Pause after a requeue, so a retry does not race the write it waits for.
    pub retry_delay: Duration,
}

impl SubscriptionConfig {
    pub fn new(topic: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription_id: subscription_id.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Requeued,
    DeadLettered,
}

/// A typed consumer of one subscription.
///
/// Messages are decoded into `T` and passed to `H` one at a time. A handler
/// error leaves the message for redelivery until the attempt count reaches
/// `max_retries`, after which it is dead-lettered. Payloads that do not
/// decode are dead-lettered straight away.
pub struct Subscriber<T, H> {
    config: SubscriptionConfig,
    source: Arc<dyn MessageSource>,
    handler: H,
    _payload: PhantomData<fn() -> T>,
}

impl<T, H> Subscriber<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: MessageHandler<T>,
{
    pub fn new(config: SubscriptionConfig, source: Arc<dyn MessageSource>, handler: H) -> Self {
        Self {
            config,
            source,
            handler,
            _payload: PhantomData,
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Binds the subscription on the transport.
    pub async fn subscribe(&self) -> Result<()> {
        self.source
            .subscribe(&self.config.topic, &self.config.subscription_id)
            .await
    }

    /// Receives and settles at most one delivery.
    pub async fn process_next(&self) -> Result<Option<DeliveryOutcome>> {
        match self
            .source
            .receive(&self.config.subscription_id, self.config.poll_interval)
            .await?
        {
            Some(delivery) => self.process(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Runs the receive loop until `shutdown` is cancelled.
    ///
    /// Cancellation only interrupts waiting for a message; a handler that
    /// already started runs to completion and its delivery is settled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.subscribe().await?;

        let subscription = self.config.subscription_id.as_str();
        tracing::info!(
            topic = %self.config.topic,
            subscription,
            max_retries = self.config.max_retries,
            "Subscriber started"
        );

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.source.receive(subscription, self.config.poll_interval) => received,
            };

            match received {
                Ok(Some(delivery)) => match self.process(delivery).await {
                    Ok(DeliveryOutcome::Requeued) => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(self.config.retry_delay) => {}
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(subscription, error = %e, "Failed to settle delivery");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(subscription, error = %e, "Receive failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(subscription, "Subscriber stopped");
        Ok(())
    }

    async fn process(&self, delivery: Delivery) -> Result<DeliveryOutcome> {
        let subscription = self.config.subscription_id.as_str();
        let message_id = delivery.message.id;

        let payload: T = match delivery.message.decode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    subscription,
                    %message_id,
                    error = %e,
                    "Undecodable payload, dead-lettering"
                );
                return self
                    .give_up(message_id, &format!("undecodable payload: {e}"))
                    .await;
            }
        };

        match self.handler.handle(payload).await {
            Ok(()) => {
                self.source.ack(subscription, message_id).await?;
                tracing::debug!(subscription, %message_id, attempt = delivery.attempt, "Acked");
                Ok(DeliveryOutcome::Acked)
            }
            Err(e) if delivery.attempt >= self.config.max_retries.max(1) => {
                tracing::error!(
                    subscription,
                    %message_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Retries exhausted, dead-lettering"
                );
                self.give_up(message_id, &e.to_string()).await
            }
            Err(e) => {
                tracing::warn!(
                    subscription,
                    %message_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Handler failed, requeueing"
                );
                self.source.nack(subscription, message_id).await?;
                Ok(DeliveryOutcome::Requeued)
            }
        }
    }

    async fn give_up(&self, message_id: MessageId, reason: &str) -> Result<DeliveryOutcome> {
        self.source
            .dead_letter(&self.config.subscription_id, message_id, reason)
            .await?;
        metrics::counter!(
            "bus_messages_dead_lettered_total",
            "subscription" => self.config.subscription_id.clone()
        )
        .increment(1);
        Ok(DeliveryOutcome::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SubscriptionConfig::new("topic", "sub");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);

        let config = config
            .with_max_retries(5)
            .with_poll_interval(Duration::from_millis(10))
            .with_retry_delay(Duration::from_millis(50));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.retry_delay, Duration::from_millis(50));
    }
}
