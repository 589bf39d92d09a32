//! Persistence for trade offers.
//!
//! The [`TradeRepository`] trait is the contract the saga components depend
//! on. Two implementations ship with the crate: an in-memory store used by
//! tests and local runs, and a PostgreSQL store built on `sqlx`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{RepositoryError, Result};
pub use memory::InMemoryTradeRepository;
pub use postgres::PostgresTradeRepository;
pub use store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Pagination, TradePage, TradeRepository};
