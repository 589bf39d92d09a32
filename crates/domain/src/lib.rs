//! Domain layer for the trade saga service.
//!
//! This crate holds the pure, I/O-free part of the system:
//! - `TradeOffer` aggregate with its validation rules
//! - `TradeStatus` state machine and its transition table
//! - `Item` value object

pub mod trade;

pub use trade::{Item, TradeError, TradeOffer, TradeOfferRecord, TradeStatus, UnknownStatus};
