//! External service contracts and in-memory implementations.

pub mod inventory;

pub use inventory::{
    InMemoryInventoryGateway, InventoryGateway, LockItemsRequest, TradeItemsRequest,
};
