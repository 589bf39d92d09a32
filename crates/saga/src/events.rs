//! Integration events exchanged with the inventory service.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{TradeId, UserId};
use domain::{Item, TradeOffer};
use event_bus::BusEvent;
use serde::{Deserialize, Serialize};

/// Announces a newly created trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOfferCreatedEvent {
    pub id: TradeId,
    pub owner_id: UserId,
    pub wanted_items_owner_id: UserId,
    pub offered_items: Vec<Item>,
    pub wanted_items: Vec<Item>,
    pub created_at: DateTime<Utc>,
}

impl From<&TradeOffer> for TradeOfferCreatedEvent {
    fn from(trade: &TradeOffer) -> Self {
        Self {
            id: trade.id(),
            owner_id: trade.owner_id().clone(),
            wanted_items_owner_id: trade.wanted_items_owner_id().clone(),
            offered_items: trade.offered_items().to_vec(),
            wanted_items: trade.wanted_items().to_vec(),
            created_at: trade.created_at(),
        }
    }
}

impl BusEvent for TradeOfferCreatedEvent {
    fn idempotency_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

/// One item the inventory service finished reserving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLockCompleted {
    pub id: String,

    /// The trade the item is reserved for.
    pub locked_by: TradeId,

    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// A batch of completed reservations, possibly covering many trades and
/// possibly repeating items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsLockCompletedEvent {
    pub items: Vec<ItemLockCompleted>,
}

impl ItemsLockCompletedEvent {
    /// Entries with repeated item ids removed, first occurrence kept.
    pub fn distinct_items(&self) -> Vec<&ItemLockCompleted> {
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items
            .iter()
            .filter(|item| seen.insert(item.id.as_str()))
            .collect()
    }

    /// Trades referenced by the distinct entries, in encounter order.
    pub fn locked_by(&self) -> Vec<TradeId> {
        let mut seen = HashSet::new();
        self.distinct_items()
            .into_iter()
            .map(|item| item.locked_by)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

impl BusEvent for ItemsLockCompletedEvent {}

/// The inventory service finished swapping a trade's items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsTradeCompletedEvent {
    pub id: TradeId,
    pub owner_id: UserId,
}

impl BusEvent for ItemsTradeCompletedEvent {
    fn idempotency_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}
