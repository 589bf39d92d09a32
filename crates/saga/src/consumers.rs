//! Handlers folding inventory confirmations back into trade state.
//!
//! Both handlers are idempotent: a redelivered confirmation for a trade
//! that already moved past the awaited status is skipped without a write.
//! A lock confirmation that overtakes the orchestrator's own write (trade
//! still `Created`) is refused so the bus redelivers it.

use async_trait::async_trait;
use common::TradeId;
use domain::{TradeOffer, TradeStatus};
use event_bus::MessageHandler;
use trade_store::TradeRepository;

use crate::error::{Result, SagaError};
use crate::events::{ItemsLockCompletedEvent, ItemsTradeCompletedEvent};

/// Moves trades whose items were reserved to `Pending`.
pub struct ItemsLockCompletedHandler<R: TradeRepository> {
    repository: R,
}

impl<R: TradeRepository> ItemsLockCompletedHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: TradeRepository> MessageHandler<ItemsLockCompletedEvent> for ItemsLockCompletedHandler<R> {
    type Error = SagaError;

    #[tracing::instrument(skip_all, fields(entries = event.items.len()))]
    async fn handle(&self, event: ItemsLockCompletedEvent) -> Result<()> {
        let trade_ids = event.locked_by();
        if trade_ids.is_empty() {
            tracing::warn!("lock confirmation without items");
            return Ok(());
        }

        let trades = self.repository.get_by_ids(&trade_ids).await?;
        if trades.len() < trade_ids.len() {
            tracing::warn!(
                requested = trade_ids.len(),
                found = trades.len(),
                "lock confirmation references unknown trades"
            );
        }

        let mut locked: Vec<TradeOffer> = Vec::with_capacity(trades.len());
        let mut unrecorded: Option<TradeId> = None;
        for mut trade in trades {
            if trade.status().is_awaiting_lock() {
                trade.update_status(TradeStatus::Pending);
                locked.push(trade);
            } else if trade.status() == TradeStatus::Created {
                // The orchestrator has not yet recorded the lock submission.
                tracing::warn!(
                    trade_id = %trade.id(),
                    "lock confirmed before submission was recorded"
                );
                unrecorded.get_or_insert(trade.id());
            } else {
                tracing::warn!(
                    trade_id = %trade.id(),
                    status = %trade.status(),
                    "trade not awaiting a lock, skipping"
                );
            }
        }

        if !locked.is_empty() {
            self.repository.update_bulk(&mut locked).await?;
            metrics::counter!("lock_confirmations_total").increment(locked.len() as u64);
            for trade in &locked {
                tracing::info!(trade_id = %trade.id(), "trade items locked");
            }
        }

        match unrecorded {
            Some(trade_id) => Err(SagaError::InvalidStatus {
                trade_id,
                expected: TradeStatus::AwaitingAnnouncement,
                actual: TradeStatus::Created,
            }),
            None => Ok(()),
        }
    }
}

/// Completes trades whose items were exchanged.
pub struct ItemsTradeCompletedHandler<R: TradeRepository> {
    repository: R,
}

impl<R: TradeRepository> ItemsTradeCompletedHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: TradeRepository> MessageHandler<ItemsTradeCompletedEvent>
    for ItemsTradeCompletedHandler<R>
{
    type Error = SagaError;

    #[tracing::instrument(skip_all, fields(trade_id = %event.id, user_id = %event.owner_id))]
    async fn handle(&self, event: ItemsTradeCompletedEvent) -> Result<()> {
        let mut trade = self
            .repository
            .get_by_id(&event.owner_id, event.id)
            .await?;

        if !trade.status().can_complete() {
            tracing::warn!(status = %trade.status(), "trade not awaiting an exchange, skipping");
            return Ok(());
        }

        trade.update_status(TradeStatus::Completed);
        self.repository.update(&mut trade).await?;

        metrics::counter!("trades_completed_total").increment(1);
        tracing::info!(trade_id = %event.id, "trade completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{TradeId, UserId};
    use domain::Item;
    use trade_store::{InMemoryTradeRepository, RepositoryError};

    use crate::events::ItemLockCompleted;

    async fn stored_trade(repository: &InMemoryTradeRepository, status: TradeStatus) -> TradeOffer {
        let mut trade = TradeOffer::create(
            TradeId::new(),
            UserId::new("alice"),
            UserId::new("bob"),
            vec![Item::new("sword", 1).unwrap()],
            vec![Item::new("shield", 1).unwrap()],
        )
        .unwrap();
        repository.insert(&trade).await.unwrap();
        if status != TradeStatus::Created {
            trade.update_status(status);
            repository.update(&mut trade).await.unwrap();
        }
        trade
    }

    fn entry(item: &str, locked_by: TradeId) -> ItemLockCompleted {
        ItemLockCompleted {
            id: item.to_string(),
            locked_by,
            quantity: 1,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lock_batch_deduplicates_and_bulk_updates_once() {
        let repository = InMemoryTradeRepository::new();
        let a = stored_trade(&repository, TradeStatus::LockPending).await;
        let b = stored_trade(&repository, TradeStatus::AwaitingAnnouncement).await;
        let handler = ItemsLockCompletedHandler::new(repository.clone());

        let event = ItemsLockCompletedEvent {
            items: vec![entry("A", a.id()), entry("A", a.id()), entry("B", b.id())],
        };
        handler.handle(event).await.unwrap();

        assert_eq!(repository.bulk_update_calls().await, 1);
        for id in [a.id(), b.id()] {
            assert_eq!(
                repository.find(id).await.unwrap().status(),
                TradeStatus::Pending
            );
        }
    }

    #[tokio::test]
    async fn test_lock_redelivery_is_skipped() {
        let repository = InMemoryTradeRepository::new();
        let a = stored_trade(&repository, TradeStatus::Pending).await;
        let handler = ItemsLockCompletedHandler::new(repository.clone());
        let writes = repository.write_calls().await;

        let event = ItemsLockCompletedEvent {
            items: vec![entry("A", a.id())],
        };
        handler.handle(event).await.unwrap();

        assert_eq!(repository.write_calls().await, writes);
    }

    #[tokio::test]
    async fn test_lock_for_unrecorded_trade_asks_for_redelivery() {
        let repository = InMemoryTradeRepository::new();
        let early = stored_trade(&repository, TradeStatus::Created).await;
        let ready = stored_trade(&repository, TradeStatus::LockPending).await;
        let handler = ItemsLockCompletedHandler::new(repository.clone());
        let event = ItemsLockCompletedEvent {
            items: vec![entry("A", early.id()), entry("B", ready.id())],
        };

        let result = handler.handle(event.clone()).await;
        assert!(matches!(
            result,
            Err(SagaError::InvalidStatus {
                actual: TradeStatus::Created,
                ..
            })
        ));
        assert_eq!(
            repository.find(early.id()).await.unwrap().status(),
            TradeStatus::Created
        );
        assert_eq!(
            repository.find(ready.id()).await.unwrap().status(),
            TradeStatus::Pending
        );

        let mut early = repository.find(early.id()).await.unwrap();
        early.update_status(TradeStatus::AwaitingAnnouncement);
        repository.update(&mut early).await.unwrap();

        handler.handle(event).await.unwrap();
        assert_eq!(
            repository.find(early.id()).await.unwrap().status(),
            TradeStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_lock_bulk_failure_is_returned() {
        let repository = InMemoryTradeRepository::new();
        let a = stored_trade(&repository, TradeStatus::LockPending).await;
        let b = stored_trade(&repository, TradeStatus::LockPending).await;
        repository.fail_updates_for(b.id()).await;
        let handler = ItemsLockCompletedHandler::new(repository.clone());

        let event = ItemsLockCompletedEvent {
            items: vec![entry("A", a.id()), entry("B", b.id())],
        };
        let result = handler.handle(event).await;

        assert!(matches!(
            result,
            Err(SagaError::Repository(RepositoryError::PartialBulkUpdate { .. }))
        ));
        assert_eq!(
            repository.find(a.id()).await.unwrap().status(),
            TradeStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_exchange_completes_trade() {
        let repository = InMemoryTradeRepository::new();
        let trade = stored_trade(&repository, TradeStatus::ExchangePending).await;
        let handler = ItemsTradeCompletedHandler::new(repository.clone());

        handler
            .handle(ItemsTradeCompletedEvent {
                id: trade.id(),
                owner_id: UserId::new("alice"),
            })
            .await
            .unwrap();

        assert_eq!(
            repository.find(trade.id()).await.unwrap().status(),
            TradeStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_exchange_redelivery_is_skipped() {
        let repository = InMemoryTradeRepository::new();
        let trade = stored_trade(&repository, TradeStatus::Completed).await;
        let handler = ItemsTradeCompletedHandler::new(repository.clone());
        let writes = repository.write_calls().await;

        handler
            .handle(ItemsTradeCompletedEvent {
                id: trade.id(),
                owner_id: UserId::new("alice"),
            })
            .await
            .unwrap();

        assert_eq!(repository.write_calls().await, writes);
    }

    #[tokio::test]
    async fn test_exchange_unknown_trade_is_retried() {
        let repository = InMemoryTradeRepository::new();
        let handler = ItemsTradeCompletedHandler::new(repository);

        let result = handler
            .handle(ItemsTradeCompletedEvent {
                id: TradeId::new(),
                owner_id: UserId::new("alice"),
            })
            .await;

        assert!(matches!(result, Err(SagaError::NotFound(_))));
    }
}
