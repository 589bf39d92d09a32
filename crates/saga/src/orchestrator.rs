//! Use-case layer driving trades in response to user actions.

use std::future::Future;
use std::time::{Duration, Instant};

use common::{TradeId, UserId};
use domain::TradeStatus;
use trade_store::{Pagination, TradeRepository};

use crate::error::{Result, SagaError};
use crate::model::{CreateTradeRequest, TradeOfferView, TradePageView, build_trade};
use crate::services::{InventoryGateway, LockItemsRequest, TradeItemsRequest};

/// Deadline applied to each repository and gateway call by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates, accepts and reads trades on behalf of a caller.
///
/// Every state change caused directly by a user goes through here. Changes
/// caused by inventory confirmations are made by the consumers instead.
pub struct TradeOrchestrator<R, G>
where
    R: TradeRepository,
    G: InventoryGateway,
{
    repository: R,
    gateway: G,
    call_timeout: Duration,
}

impl<R, G> TradeOrchestrator<R, G>
where
    R: TradeRepository,
    G: InventoryGateway,
{
    /// Creates a new orchestrator.
    pub fn new(repository: R, gateway: G) -> Self {
        Self {
            repository,
            gateway,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the deadline for each external call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Creates a trade owned by `caller_id` and submits the item reservation.
    ///
    /// The trade is persisted in `Created` before the gateway is called. On
    /// a rejected or timed out reservation it is moved to `Error` and
    /// `LockFailed` is returned; otherwise it waits in `AwaitingAnnouncement`.
    #[tracing::instrument(
        skip_all,
        fields(%correlation_id, user_id = %caller_id, trade_id = tracing::field::Empty)
    )]
    pub async fn create(
        &self,
        correlation_id: &str,
        caller_id: &UserId,
        request: CreateTradeRequest,
    ) -> Result<TradeId> {
        let started = Instant::now();
        let result = self.create_trade(caller_id, request).await;
        record_duration("create", started);
        result
    }

    async fn create_trade(&self, caller_id: &UserId, request: CreateTradeRequest) -> Result<TradeId> {
        let mut trade = build_trade(caller_id, request).inspect_err(|e| {
            metrics::counter!("trades_failed_total", "stage" => "validation").increment(1);
            tracing::warn!(error = %e, "rejected trade request");
        })?;
        let trade_id = trade.id();
        tracing::Span::current().record("trade_id", tracing::field::display(trade_id));

        self.bounded("insert trade", self.repository.insert(&trade))
            .await?;

        let submitted = self
            .submit(self.gateway.lock_items(LockItemsRequest::from(&trade)))
            .await;

        match submitted {
            Ok(()) => {
                trade.update_status(TradeStatus::AwaitingAnnouncement);
                self.bounded("update trade", self.repository.update(&mut trade))
                    .await?;

                metrics::counter!("trades_created_total").increment(1);
                tracing::info!(%trade_id, status = %trade.status(), "trade created");
                Ok(trade_id)
            }
            Err(reason) => {
                trade.update_status(TradeStatus::Error);
                self.bounded("update trade", self.repository.update(&mut trade))
                    .await?;

                metrics::counter!("trades_failed_total", "stage" => "lock").increment(1);
                tracing::error!(%trade_id, %reason, "item lock failed");
                Err(SagaError::LockFailed { trade_id, reason })
            }
        }
    }

    /// Accepts a pending trade on behalf of its counter-party and submits
    /// the exchange.
    ///
    /// Nothing is written if the trade is not `Pending` or the caller is not
    /// the wanted-items owner. On a rejected or timed out exchange the trade
    /// is moved to `Error` and `ExchangeFailed` is returned; otherwise it
    /// waits in `ExchangePending`.
    #[tracing::instrument(skip_all, fields(%correlation_id, user_id = %caller_id, %trade_id))]
    pub async fn accept(
        &self,
        correlation_id: &str,
        caller_id: &UserId,
        trade_id: TradeId,
    ) -> Result<()> {
        let started = Instant::now();
        let result = self.accept_trade(caller_id, trade_id).await;
        record_duration("accept", started);
        result
    }

    async fn accept_trade(&self, caller_id: &UserId, trade_id: TradeId) -> Result<()> {
        let mut trade = self
            .bounded("load trade", self.repository.get_by_id(caller_id, trade_id))
            .await?;

        if !trade.status().can_accept() {
            return Err(SagaError::InvalidStatus {
                trade_id,
                expected: TradeStatus::Pending,
                actual: trade.status(),
            });
        }

        if trade.wanted_items_owner_id() != caller_id {
            return Err(SagaError::NotCounterparty {
                trade_id,
                caller: caller_id.clone(),
            });
        }

        trade.update_status(TradeStatus::Accepted);
        self.bounded("update trade", self.repository.update(&mut trade))
            .await?;

        let submitted = self
            .submit(self.gateway.trade_items(TradeItemsRequest::from(&trade)))
            .await;

        match submitted {
            Ok(()) => {
                trade.update_status(TradeStatus::ExchangePending);
                self.bounded("update trade", self.repository.update(&mut trade))
                    .await?;

                metrics::counter!("trades_accepted_total").increment(1);
                tracing::info!(%trade_id, status = %trade.status(), "trade accepted");
                Ok(())
            }
            Err(reason) => {
                trade.update_status(TradeStatus::Error);
                self.bounded("update trade", self.repository.update(&mut trade))
                    .await?;

                metrics::counter!("trades_failed_total", "stage" => "exchange").increment(1);
                tracing::error!(%trade_id, %reason, "item exchange failed");
                Err(SagaError::ExchangeFailed { trade_id, reason })
            }
        }
    }

    /// Lists the caller's trades.
    #[tracing::instrument(skip_all, fields(%correlation_id, user_id = %caller_id))]
    pub async fn get(
        &self,
        correlation_id: &str,
        caller_id: &UserId,
        pagination: &Pagination,
    ) -> Result<TradePageView> {
        let page = self
            .bounded("list trades", self.repository.get(caller_id, pagination))
            .await?;
        Ok(page.into())
    }

    /// Loads one of the caller's trades.
    #[tracing::instrument(skip_all, fields(%correlation_id, user_id = %caller_id, %trade_id))]
    pub async fn get_by_id(
        &self,
        correlation_id: &str,
        caller_id: &UserId,
        trade_id: TradeId,
    ) -> Result<TradeOfferView> {
        let trade = self
            .bounded("load trade", self.repository.get_by_id(caller_id, trade_id))
            .await?;
        Ok(TradeOfferView::from(&trade))
    }

    /// Runs a repository call under the deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = trade_store::Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| SagaError::Timeout { operation })?
            .map_err(SagaError::from)
    }

    /// Runs a gateway submission under the deadline; any failure is final.
    async fn submit(&self, call: impl Future<Output = Result<()>>) -> std::result::Result<(), String> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "no answer within {}ms",
                self.call_timeout.as_millis()
            )),
        }
    }
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!("orchestrator_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemModel;
    use crate::services::InMemoryInventoryGateway;
    use async_trait::async_trait;
    use trade_store::InMemoryTradeRepository;

    const CID: &str = "test-correlation";

    fn setup() -> (
        TradeOrchestrator<InMemoryTradeRepository, InMemoryInventoryGateway>,
        InMemoryTradeRepository,
        InMemoryInventoryGateway,
    ) {
        let repository = InMemoryTradeRepository::new();
        let gateway = InMemoryInventoryGateway::new();
        let orchestrator = TradeOrchestrator::new(repository.clone(), gateway.clone());
        (orchestrator, repository, gateway)
    }

    fn request(counterparty: &str) -> CreateTradeRequest {
        CreateTradeRequest {
            offered_items: vec![ItemModel::new("sword", 1)],
            wanted_items: vec![ItemModel::new("shield", 1)],
            wanted_items_owner_id: counterparty.to_string(),
        }
    }

    async fn force_status(repository: &InMemoryTradeRepository, id: TradeId, status: TradeStatus) {
        let mut trade = repository.find(id).await.unwrap();
        trade.update_status(status);
        repository.update(&mut trade).await.unwrap();
    }

    /// Gateway that never answers.
    struct HangingGateway;

    #[async_trait]
    impl InventoryGateway for HangingGateway {
        async fn lock_items(&self, _request: LockItemsRequest) -> Result<()> {
            std::future::pending().await
        }

        async fn trade_items(&self, _request: TradeItemsRequest) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_create_happy_path() {
        let (orchestrator, repository, gateway) = setup();
        let alice = UserId::new("alice");

        let id = orchestrator.create(CID, &alice, request("bob")).await.unwrap();

        let stored = repository.find(id).await.unwrap();
        assert_eq!(stored.status(), TradeStatus::AwaitingAnnouncement);
        assert_eq!(stored.owner_id(), &alice);
        assert_eq!(gateway.lock_requests().len(), 1);
        assert_eq!(gateway.lock_requests()[0].locked_by, id);
    }

    #[tokio::test]
    async fn test_create_validation_writes_nothing() {
        let (orchestrator, repository, gateway) = setup();

        let mut bad = request("bob");
        bad.offered_items = vec![ItemModel::new("sword", 0)];
        let result = orchestrator.create(CID, &UserId::new("alice"), bad).await;

        assert!(matches!(result, Err(SagaError::Validation(_))));
        assert_eq!(repository.write_calls().await, 0);
        assert!(gateway.lock_requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_lock_failure_moves_to_error() {
        let (orchestrator, repository, gateway) = setup();
        gateway.set_fail_on_lock(true);

        let result = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await;

        let trade_id = match result {
            Err(SagaError::LockFailed { trade_id, .. }) => trade_id,
            other => panic!("expected LockFailed, got {other:?}"),
        };
        assert_eq!(repository.trade_count().await, 1);
        assert_eq!(
            repository.find(trade_id).await.unwrap().status(),
            TradeStatus::Error
        );
    }

    #[tokio::test]
    async fn test_create_gateway_timeout_is_lock_failure() {
        let repository = InMemoryTradeRepository::new();
        let orchestrator = TradeOrchestrator::new(repository.clone(), HangingGateway)
            .with_call_timeout(Duration::from_millis(20));

        let result = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await;

        assert!(matches!(result, Err(SagaError::LockFailed { .. })));
        assert_eq!(repository.all().await[0].status(), TradeStatus::Error);
    }

    #[tokio::test]
    async fn test_accept_happy_path() {
        let (orchestrator, repository, gateway) = setup();
        let id = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await
            .unwrap();
        force_status(&repository, id, TradeStatus::Pending).await;

        orchestrator.accept(CID, &UserId::new("bob"), id).await.unwrap();

        assert_eq!(
            repository.find(id).await.unwrap().status(),
            TradeStatus::ExchangePending
        );
        assert_eq!(gateway.trade_requests().len(), 1);
        assert_eq!(gateway.trade_requests()[0].trade_id, id);
    }

    #[tokio::test]
    async fn test_accept_requires_pending() {
        let (orchestrator, repository, _) = setup();
        let id = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await
            .unwrap();
        let writes = repository.write_calls().await;

        let result = orchestrator.accept(CID, &UserId::new("bob"), id).await;

        assert!(matches!(
            result,
            Err(SagaError::InvalidStatus {
                actual: TradeStatus::AwaitingAnnouncement,
                ..
            })
        ));
        assert_eq!(repository.write_calls().await, writes);
    }

    #[tokio::test]
    async fn test_accept_by_owner_is_rejected() {
        let (orchestrator, repository, gateway) = setup();
        let id = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await
            .unwrap();
        force_status(&repository, id, TradeStatus::Pending).await;
        let writes = repository.write_calls().await;

        let result = orchestrator.accept(CID, &UserId::new("alice"), id).await;

        assert!(matches!(result, Err(SagaError::NotCounterparty { .. })));
        assert_eq!(repository.write_calls().await, writes);
        assert!(gateway.trade_requests().is_empty());
    }

    #[tokio::test]
    async fn test_accept_exchange_failure_moves_to_error() {
        let (orchestrator, repository, gateway) = setup();
        let id = orchestrator
            .create(CID, &UserId::new("alice"), request("bob"))
            .await
            .unwrap();
        force_status(&repository, id, TradeStatus::Pending).await;
        gateway.set_fail_on_trade(true);

        let result = orchestrator.accept(CID, &UserId::new("bob"), id).await;

        assert!(matches!(result, Err(SagaError::ExchangeFailed { .. })));
        assert_eq!(
            repository.find(id).await.unwrap().status(),
            TradeStatus::Error
        );
    }

    #[tokio::test]
    async fn test_accept_unknown_trade() {
        let (orchestrator, _, _) = setup();
        let result = orchestrator
            .accept(CID, &UserId::new("bob"), TradeId::new())
            .await;
        assert!(matches!(result, Err(SagaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_views() {
        let (orchestrator, _, _) = setup();
        let alice = UserId::new("alice");
        let id = orchestrator.create(CID, &alice, request("bob")).await.unwrap();

        let view = orchestrator.get_by_id(CID, &alice, id).await.unwrap();
        assert_eq!(view.id, id);
        assert_eq!(view.status, TradeStatus::AwaitingAnnouncement);
        assert!(view.updated_at.is_some());

        let page = orchestrator
            .get(CID, &UserId::new("bob"), &Pagination::new())
            .await
            .unwrap();
        assert_eq!(page.trades.len(), 1);
        assert!(page.token.is_none());

        let result = orchestrator
            .get_by_id(CID, &UserId::new("mallory"), id)
            .await;
        assert!(matches!(result, Err(SagaError::NotFound(_))));
    }
}
