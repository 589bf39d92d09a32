//! Trade saga coordination.
//!
//! A trade moves through its lifecycle in three cooperating parts:
//! 1. [`TradeOrchestrator`] handles user actions (create, accept, read) and
//!    submits requests to the inventory service.
//! 2. [`OutboxDispatcher`] announces newly created trades on the bus.
//! 3. The consumers in [`consumers`] fold the inventory service's
//!    asynchronous confirmations back into trade state.
//!
//! Any rejected submission moves the trade to the terminal `Error` status.

pub mod consumers;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod services;
pub mod topics;

pub use consumers::{ItemsLockCompletedHandler, ItemsTradeCompletedHandler};
pub use dispatcher::{DispatchReport, OutboxDispatcher};
pub use error::{Result, SagaError};
pub use events::{
    ItemLockCompleted, ItemsLockCompletedEvent, ItemsTradeCompletedEvent, TradeOfferCreatedEvent,
};
pub use model::{CreateTradeRequest, ItemModel, TradeOfferView, TradePageView};
pub use orchestrator::{DEFAULT_CALL_TIMEOUT, TradeOrchestrator};
pub use services::{
    InMemoryInventoryGateway, InventoryGateway, LockItemsRequest, TradeItemsRequest,
};
