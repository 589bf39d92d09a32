//! Request and view models of the orchestrator.

use chrono::{DateTime, Utc};
use common::{TradeId, UserId};
use domain::{Item, TradeError, TradeOffer, TradeStatus};
use serde::{Deserialize, Serialize};
use trade_store::TradePage;

/// An item as it appears in requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemModel {
    pub id: String,
    pub quantity: i64,
}

impl ItemModel {
    pub fn new(id: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }
}

impl TryFrom<ItemModel> for Item {
    type Error = TradeError;

    fn try_from(model: ItemModel) -> Result<Self, Self::Error> {
        Item::new(model.id, model.quantity)
    }
}

impl From<&Item> for ItemModel {
    fn from(item: &Item) -> Self {
        Self::new(item.id(), item.quantity())
    }
}

/// Proposal of a new trade by the calling user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTradeRequest {
    #[serde(default)]
    pub offered_items: Vec<ItemModel>,

    #[serde(default)]
    pub wanted_items: Vec<ItemModel>,

    /// The user who owns the wanted items.
    #[serde(default)]
    pub wanted_items_owner_id: String,
}

/// Read model of one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOfferView {
    pub id: TradeId,
    pub status: TradeStatus,
    pub offered_items: Vec<ItemModel>,
    pub wanted_items: Vec<ItemModel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&TradeOffer> for TradeOfferView {
    fn from(trade: &TradeOffer) -> Self {
        Self {
            id: trade.id(),
            status: trade.status(),
            offered_items: trade.offered_items().iter().map(ItemModel::from).collect(),
            wanted_items: trade.wanted_items().iter().map(ItemModel::from).collect(),
            created_at: trade.created_at(),
            updated_at: trade.updated_at(),
        }
    }
}

/// One page of the caller's trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePageView {
    pub trades: Vec<TradeOfferView>,

    /// Pass back to fetch the next page; absent on the last page.
    pub token: Option<String>,
}

impl From<TradePage> for TradePageView {
    fn from(page: TradePage) -> Self {
        Self {
            trades: page.trades.iter().map(TradeOfferView::from).collect(),
            token: page.next_token,
        }
    }
}

/// Builds a validated trade in `Created` from a request.
pub(crate) fn build_trade(
    owner_id: &UserId,
    request: CreateTradeRequest,
) -> Result<TradeOffer, TradeError> {
    let offered_items = request
        .offered_items
        .into_iter()
        .map(Item::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let wanted_items = request
        .wanted_items
        .into_iter()
        .map(Item::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    TradeOffer::create(
        TradeId::new(),
        owner_id.clone(),
        UserId::new(request.wanted_items_owner_id),
        offered_items,
        wanted_items,
    )
}
