//! Trade offer aggregate and related types.

mod aggregate;
mod state;
mod value_objects;

pub use aggregate::{TradeOffer, TradeOfferRecord};
pub use state::{TradeStatus, UnknownStatus};
pub use value_objects::Item;

use thiserror::Error;

/// Validation errors raised while building a trade offer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    /// Trade ID is required.
    #[error("Trade ID is required")]
    EmptyTradeId,

    /// Owner ID is required.
    #[error("Owner ID is required")]
    EmptyOwnerId,

    /// The counter-party is required.
    #[error("Wanted items owner ID is required")]
    EmptyWantedItemsOwnerId,

    /// At least one item must be offered.
    #[error("Trade offers no items")]
    NoOfferedItems,

    /// At least one item must be wanted.
    #[error("Trade wants no items")]
    NoWantedItems,

    /// Item ID is required.
    #[error("Item ID is required")]
    EmptyItemId,

    /// Invalid quantity.
    #[error("Invalid quantity for item {item_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { item_id: String, quantity: i64 },
}
