//! Outbox dispatcher announcing newly created trades.

use std::time::Duration;

use domain::{TradeOffer, TradeStatus};
use event_bus::{Publisher, PublisherExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use trade_store::TradeRepository;

use crate::error::Result;
use crate::events::TradeOfferCreatedEvent;
use crate::topics;

/// Outcome of one dispatcher pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Trades found awaiting announcement.
    pub scanned: usize,
    /// Trades announced and advanced to `LockPending`.
    pub published: usize,
    /// Trades left for the next pass.
    pub failed: usize,
}

/// Publishes a `TradeOfferCreatedEvent` for every trade in
/// `AwaitingAnnouncement` and then advances it to `LockPending`.
///
/// Delivery is at-least-once: if the status write fails after a successful
/// publish, the next pass publishes again with the same idempotency key.
pub struct OutboxDispatcher<R, P>
where
    R: TradeRepository,
    P: Publisher,
{
    repository: R,
    publisher: P,
    topic: String,
}

impl<R, P> OutboxDispatcher<R, P>
where
    R: TradeRepository,
    P: Publisher,
{
    /// Creates a dispatcher publishing to the default topic.
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
            topic: topics::TRADE_OFFER_CREATED.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Runs a single pass. Individual trade failures are counted, not returned.
    #[tracing::instrument(skip(self), fields(topic = %self.topic))]
    pub async fn run_once(&self) -> Result<DispatchReport> {
        let trades = self
            .repository
            .get_by_status(TradeStatus::AwaitingAnnouncement)
            .await?;

        let mut report = DispatchReport {
            scanned: trades.len(),
            ..Default::default()
        };

        for mut trade in trades {
            let trade_id = trade.id();
            match self.dispatch(&mut trade).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("dispatch_failures_total").increment(1);
                    tracing::error!(%trade_id, error = %e, "failed to dispatch trade");
                }
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, trade: &mut TradeOffer) -> Result<()> {
        let event = TradeOfferCreatedEvent::from(&*trade);
        let message_id = self.publisher.publish_event(&self.topic, &event).await?;

        trade.update_status(TradeStatus::LockPending);
        self.repository.update(trade).await?;

        metrics::counter!("trades_dispatched_total").increment(1);
        tracing::info!(trade_id = %trade.id(), %message_id, "trade announced");
        Ok(())
    }

    /// Runs a pass every `interval` until `shutdown` is cancelled.
    ///
    /// A pass that already started is finished before returning.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(topic = %self.topic, ?interval, "dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once().await {
                Ok(report) if report.scanned > 0 => {
                    tracing::info!(
                        scanned = report.scanned,
                        published = report.published,
                        failed = report.failed,
                        "dispatch pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "dispatch pass failed"),
            }
        }

        tracing::info!("dispatcher stopped");
    }
}
