use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{BusError, Delivery, Message, MessageId, MessageSource, Publisher, Result};

/// Entries kept in the published and dead-letter logs by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct SubscriptionQueue {
    /// Messages waiting for delivery with the number of attempts so far.
    ready: VecDeque<(Message, u32)>,
    in_flight: HashMap<MessageId, Delivery>,
    dead_letters: VecDeque<(Message, String)>,
}

#[derive(Debug, Default)]
struct BusState {
    /// Topic name to bound subscription ids.
    bindings: HashMap<String, Vec<String>>,
    queues: HashMap<String, SubscriptionQueue>,
    published: VecDeque<Message>,
    fail_on_publish: bool,
}

impl BusState {
    fn queue(&mut self, subscription: &str) -> Result<&mut SubscriptionQueue> {
        self.queues
            .get_mut(subscription)
            .ok_or_else(|| BusError::UnknownSubscription(subscription.to_string()))
    }
}

/// Appends to a log, dropping the oldest entries beyond `limit`.
fn push_bounded<T>(log: &mut VecDeque<T>, entry: T, limit: usize) {
    if limit == 0 {
        return;
    }
    while log.len() >= limit {
        log.pop_front();
    }
    log.push_back(entry);
}

/// In-process message bus with at-least-once delivery.
///
/// Each topic fans out to every subscription bound to it, and each
/// subscription keeps its own queue. A received message stays in flight
/// until it is acked, nacked (requeued at the front with its attempt count)
/// or dead-lettered. Messages published before a subscription is bound are
/// not delivered to it.
///
/// The published and dead-letter logs keep only the most recent
/// `history_limit` entries each.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    notify: Arc<Notify>,
    history_limit: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus whose logs keep at most `history_limit` entries; 0 disables them.
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: Arc::default(),
            notify: Arc::default(),
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_take(&self, subscription: &str) -> Result<Option<Delivery>> {
        let mut state = self.lock();
        let queue = state.queue(subscription)?;

        Ok(queue.ready.pop_front().map(|(message, attempts)| {
            let delivery = Delivery {
                message,
                attempt: attempts + 1,
            };
            queue
                .in_flight
                .insert(delivery.message.id, delivery.clone());
            delivery
        }))
    }

    /// Makes every following publish fail.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.lock().fail_on_publish = fail;
    }

    /// Returns the retained published messages in publish order.
    pub fn published(&self) -> Vec<Message> {
        self.lock().published.iter().cloned().collect()
    }

    /// Returns the messages published to one topic.
    pub fn published_to(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .published
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of messages waiting for delivery on a subscription.
    pub fn pending(&self, subscription: &str) -> usize {
        self.lock()
            .queues
            .get(subscription)
            .map_or(0, |queue| queue.ready.len())
    }

    /// Number of received but unsettled messages on a subscription.
    pub fn in_flight(&self, subscription: &str) -> usize {
        self.lock()
            .queues
            .get(subscription)
            .map_or(0, |queue| queue.in_flight.len())
    }

    /// Messages given up on, with the reason.
    pub fn dead_letters(&self, subscription: &str) -> Vec<(Message, String)> {
        self.lock()
            .queues
            .get(subscription)
            .map(|queue| queue.dead_letters.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, message: Message) -> Result<MessageId> {
        let id = message.id;
        {
            let mut state = self.lock();

            if state.fail_on_publish {
                return Err(BusError::PublishFailed {
                    topic: message.topic,
                    reason: "broker unavailable".to_string(),
                });
            }

            let subscriptions = state
                .bindings
                .get(&message.topic)
                .cloned()
                .unwrap_or_default();

            for subscription in subscriptions {
                if let Some(queue) = state.queues.get_mut(&subscription) {
                    queue.ready.push_back((message.clone(), 0));
                }
            }

            push_bounded(&mut state.published, message, self.history_limit);
        }

        self.notify.notify_waiters();
        Ok(id)
    }
}

#[async_trait]
impl MessageSource for InMemoryBus {
    async fn subscribe(&self, topic: &str, subscription: &str) -> Result<()> {
        let mut state = self.lock();

        let bound = state.bindings.entry(topic.to_string()).or_default();
        if !bound.iter().any(|s| s == subscription) {
            bound.push(subscription.to_string());
        }
        state.queues.entry(subscription.to_string()).or_default();

        Ok(())
    }

    async fn receive(&self, subscription: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a publish in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(subscription)? {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, subscription: &str, id: MessageId) -> Result<()> {
        let mut state = self.lock();
        state
            .queue(subscription)?
            .in_flight
            .remove(&id)
            .map(|_| ())
            .ok_or(BusError::NotInFlight(id))
    }

    async fn nack(&self, subscription: &str, id: MessageId) -> Result<()> {
        {
            let mut state = self.lock();
            let queue = state.queue(subscription)?;
            let delivery = queue.in_flight.remove(&id).ok_or(BusError::NotInFlight(id))?;
            queue
                .ready
                .push_front((delivery.message, delivery.attempt));
        }

        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, subscription: &str, id: MessageId, reason: &str) -> Result<()> {
        let mut state = self.lock();
        let queue = state.queue(subscription)?;
        let delivery = queue.in_flight.remove(&id).ok_or(BusError::NotInFlight(id))?;
        push_bounded(
            &mut queue.dead_letters,
            (delivery.message, reason.to_string()),
            self.history_limit,
        );
        Ok(())
    }
}
