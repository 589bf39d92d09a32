//! Inventory gateway trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{TradeId, UserId};
use domain::{Item, TradeOffer};

use crate::error::SagaError;

/// Reservation of both parties' items for a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockItemsRequest {
    /// The trade the reservation is held for; echoed back as `locked_by`.
    pub locked_by: TradeId,
    pub owner_id: UserId,
    pub wanted_items_owner_id: UserId,
    pub offered_items: Vec<Item>,
    pub wanted_items: Vec<Item>,
}

impl From<&TradeOffer> for LockItemsRequest {
    fn from(trade: &TradeOffer) -> Self {
        Self {
            locked_by: trade.id(),
            owner_id: trade.owner_id().clone(),
            wanted_items_owner_id: trade.wanted_items_owner_id().clone(),
            offered_items: trade.offered_items().to_vec(),
            wanted_items: trade.wanted_items().to_vec(),
        }
    }
}

/// Exchange of the reserved items between the two parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeItemsRequest {
    pub trade_id: TradeId,
    pub owner_id: UserId,
    pub wanted_items_owner_id: UserId,
    pub offered_items: Vec<Item>,
    pub wanted_items: Vec<Item>,
}

impl From<&TradeOffer> for TradeItemsRequest {
    fn from(trade: &TradeOffer) -> Self {
        Self {
            trade_id: trade.id(),
            owner_id: trade.owner_id().clone(),
            wanted_items_owner_id: trade.wanted_items_owner_id().clone(),
            offered_items: trade.offered_items().to_vec(),
            wanted_items: trade.wanted_items().to_vec(),
        }
    }
}

/// Submits requests to the external inventory service.
///
/// `Ok` only means the request was accepted; the outcome arrives later as a
/// confirmation event. An error is a definitive submission failure.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Asks the inventory service to reserve the trade's items.
    async fn lock_items(&self, request: LockItemsRequest) -> Result<(), SagaError>;

    /// Asks the inventory service to swap the reserved items.
    async fn trade_items(&self, request: TradeItemsRequest) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: InventoryGateway + ?Sized> InventoryGateway for Arc<T> {
    async fn lock_items(&self, request: LockItemsRequest) -> Result<(), SagaError> {
        (**self).lock_items(request).await
    }

    async fn trade_items(&self, request: TradeItemsRequest) -> Result<(), SagaError> {
        (**self).trade_items(request).await
    }
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    lock_requests: Vec<LockItemsRequest>,
    trade_requests: Vec<TradeItemsRequest>,
    fail_on_lock: bool,
    fail_on_trade: bool,
}

/// In-memory inventory gateway for testing and local runs.
///
/// Records every accepted request. Rejected requests are not recorded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryGateway {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryGateway {
    /// Creates a new in-memory inventory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the gateway to reject lock requests.
    pub fn set_fail_on_lock(&self, fail: bool) {
        self.write().fail_on_lock = fail;
    }

    /// Configures the gateway to reject exchange requests.
    pub fn set_fail_on_trade(&self, fail: bool) {
        self.write().fail_on_trade = fail;
    }

    /// Returns the accepted lock requests in submission order.
    pub fn lock_requests(&self) -> Vec<LockItemsRequest> {
        self.read().lock_requests.clone()
    }

    /// Returns the accepted exchange requests in submission order.
    pub fn trade_requests(&self) -> Vec<TradeItemsRequest> {
        self.read().trade_requests.clone()
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventoryGateway {
    async fn lock_items(&self, request: LockItemsRequest) -> Result<(), SagaError> {
        let mut state = self.write();

        if state.fail_on_lock {
            return Err(SagaError::Inventory("Items unavailable".to_string()));
        }

        state.lock_requests.push(request);
        Ok(())
    }

    async fn trade_items(&self, request: TradeItemsRequest) -> Result<(), SagaError> {
        let mut state = self.write();

        if state.fail_on_trade {
            return Err(SagaError::Inventory("Exchange rejected".to_string()));
        }

        state.trade_requests.push(request);
        Ok(())
    }
}
