//! Value objects for the trade domain.

use serde::{Deserialize, Serialize};

use super::TradeError;

/// A quantity of one inventory item, as offered or wanted in a trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Identifier of the item in the inventory service.
    id: String,

    /// Number of units, always at least 1.
    quantity: i64,
}

impl Item {
    /// Creates a validated item.
    pub fn new(id: impl Into<String>, quantity: i64) -> Result<Self, TradeError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(TradeError::EmptyItemId);
        }

        if quantity < 1 {
            return Err(TradeError::InvalidQuantity { item_id: id, quantity });
        }

        Ok(Self { id, quantity })
    }

    /// Returns the item identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the quantity.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}
