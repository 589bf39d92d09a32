//! Topic and subscription names used by the trade saga.

/// Announcements of newly created trades.
pub const TRADE_OFFER_CREATED: &str = "trade-offer-created";

/// Inventory reservations finished.
pub const ITEMS_LOCK_COMPLETED: &str = "items-lock-completed";

/// Inventory exchanges finished.
pub const ITEMS_TRADE_COMPLETED: &str = "items-trade-completed";

const SUBSCRIPTION_PREFIX: &str = "trades.";

/// Durable subscription id this service uses for `topic`.
pub fn subscription_id(topic: &str) -> String {
    format!("{SUBSCRIPTION_PREFIX}{topic}")
}
