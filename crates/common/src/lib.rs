//! Shared identifier types used across the trade saga crates.

mod types;

pub use types::{TradeId, UserId};
