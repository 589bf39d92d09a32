use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use event_bus::{
    BusEvent, DeliveryOutcome, InMemoryBus, MessageHandler, MessageSource, Publisher, PublisherExt,
    Subscriber, SubscriptionConfig,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "pings";
const SUBSCRIPTION: &str = "test.pings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    id: String,
    n: u32,
}

impl BusEvent for Ping {
    fn idempotency_key(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

/// Records payloads and fails the first `failures` calls.
#[derive(Clone, Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Vec<Ping>>>,
    failures: Arc<AtomicU32>,
}

impl RecordingHandler {
    fn failing(times: u32) -> Self {
        let handler = Self::default();
        handler.failures.store(times, Ordering::SeqCst);
        handler
    }

    fn seen(&self) -> Vec<Ping> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler<Ping> for RecordingHandler {
    type Error = String;

    async fn handle(&self, payload: Ping) -> Result<(), String> {
        self.seen.lock().unwrap().push(payload);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err("temporarily unavailable".to_string());
        }
        Ok(())
    }
}

fn config() -> SubscriptionConfig {
    SubscriptionConfig::new(TOPIC, SUBSCRIPTION).with_poll_interval(Duration::from_millis(20))
}

async fn setup(handler: RecordingHandler) -> (InMemoryBus, Subscriber<Ping, RecordingHandler>) {
    let bus = InMemoryBus::new();
    let subscriber = Subscriber::new(config(), Arc::new(bus.clone()), handler);
    subscriber.subscribe().await.unwrap();
    (bus, subscriber)
}

fn ping(n: u32) -> Ping {
    Ping {
        id: format!("ping-{n}"),
        n,
    }
}

#[tokio::test]
async fn publish_event_sets_idempotency_key() {
    let bus = InMemoryBus::new();
    bus.publish_event(TOPIC, &ping(1)).await.unwrap();

    let published = bus.published_to(TOPIC);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].idempotency_key.as_deref(), Some("ping-1"));
    assert_eq!(published[0].decode::<Ping>().unwrap(), ping(1));
}

#[tokio::test]
async fn successful_handler_acks() {
    let handler = RecordingHandler::default();
    let (bus, subscriber) = setup(handler.clone()).await;

    bus.publish_event(TOPIC, &ping(1)).await.unwrap();

    let outcome = subscriber.process_next().await.unwrap();
    assert_eq!(outcome, Some(DeliveryOutcome::Acked));
    assert_eq!(handler.seen(), vec![ping(1)]);
    assert_eq!(bus.in_flight(SUBSCRIPTION), 0);
    assert_eq!(bus.pending(SUBSCRIPTION), 0);
}

#[tokio::test]
async fn nothing_to_receive() {
    let (_bus, subscriber) = setup(RecordingHandler::default()).await;
    assert_eq!(subscriber.process_next().await.unwrap(), None);
}

#[tokio::test]
async fn failing_handler_is_retried_then_succeeds() {
    let handler = RecordingHandler::failing(2);
    let (bus, subscriber) = setup(handler.clone()).await;

    bus.publish_event(TOPIC, &ping(1)).await.unwrap();

    assert_eq!(
        subscriber.process_next().await.unwrap(),
        Some(DeliveryOutcome::Requeued)
    );
    assert_eq!(
        subscriber.process_next().await.unwrap(),
        Some(DeliveryOutcome::Requeued)
    );
    assert_eq!(
        subscriber.process_next().await.unwrap(),
        Some(DeliveryOutcome::Acked)
    );

    assert_eq!(handler.seen().len(), 3);
    assert!(bus.dead_letters(SUBSCRIPTION).is_empty());
}

#[tokio::test]
async fn exhausted_retries_dead_letter() {
    let handler = RecordingHandler::failing(u32::MAX);
    let (bus, subscriber) = setup(handler.clone()).await;

    bus.publish_event(TOPIC, &ping(1)).await.unwrap();

    let mut outcomes = Vec::new();
    while let Some(outcome) = subscriber.process_next().await.unwrap() {
        outcomes.push(outcome);
    }

    assert_eq!(
        outcomes,
        vec![
            DeliveryOutcome::Requeued,
            DeliveryOutcome::Requeued,
            DeliveryOutcome::DeadLettered,
        ]
    );
    assert_eq!(handler.seen().len(), 3);

    let dead = bus.dead_letters(SUBSCRIPTION);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1, "temporarily unavailable");
}

#[tokio::test]
async fn undecodable_payload_is_dead_lettered_immediately() {
    let handler = RecordingHandler::default();
    let (bus, subscriber) = setup(handler.clone()).await;

    bus.publish(event_bus::Message::new(
        TOPIC,
        serde_json::json!({ "unexpected": true }),
    ))
    .await
    .unwrap();

    assert_eq!(
        subscriber.process_next().await.unwrap(),
        Some(DeliveryOutcome::DeadLettered)
    );
    assert!(handler.seen().is_empty());
    assert_eq!(bus.dead_letters(SUBSCRIPTION).len(), 1);
}

#[tokio::test]
async fn run_loop_processes_in_order_and_stops_on_cancel() {
    let bus = InMemoryBus::new();
    let handler = RecordingHandler::default();
    let subscriber = Subscriber::new(config(), Arc::new(bus.clone()), handler.clone());
    bus.subscribe(TOPIC, SUBSCRIPTION).await.unwrap();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(subscriber.run(shutdown.clone()));

    for n in 1..=3 {
        bus.publish_event(TOPIC, &ping(n)).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handler.seen().len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    task.await.unwrap().unwrap();

    let seen: Vec<u32> = handler.seen().iter().map(|p| p.n).collect();
    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(bus.in_flight(SUBSCRIPTION), 0);
}
