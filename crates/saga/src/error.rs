//! Saga error types.

use common::{TradeId, UserId};
use domain::{TradeError, TradeStatus};
use event_bus::BusError;
use thiserror::Error;
use trade_store::RepositoryError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The create request was malformed; nothing was persisted.
    #[error("Validation error: {0}")]
    Validation(#[from] TradeError),

    /// No trade with this id is visible to the caller.
    #[error("Trade not found: {0}")]
    NotFound(TradeId),

    /// The trade is not in the status the action requires.
    #[error("Trade {trade_id} is {actual}, expected {expected}")]
    InvalidStatus {
        trade_id: TradeId,
        expected: TradeStatus,
        actual: TradeStatus,
    },

    /// Only the wanted-items owner may accept a trade.
    #[error("User {caller} is not the counter-party of trade {trade_id}")]
    NotCounterparty { trade_id: TradeId, caller: UserId },

    /// The item reservation was rejected; the trade is now in `Error`.
    #[error("Locking items for trade {trade_id} failed: {reason}")]
    LockFailed { trade_id: TradeId, reason: String },

    /// The item exchange was rejected; the trade is now in `Error`.
    #[error("Exchanging items for trade {trade_id} failed: {reason}")]
    ExchangeFailed { trade_id: TradeId, reason: String },

    /// Inventory service error.
    #[error("Inventory service error: {0}")]
    Inventory(String),

    /// A collaborator did not answer within the deadline.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// Repository error.
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    /// Message bus error.
    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<RepositoryError> for SagaError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => SagaError::NotFound(id),
            other => SagaError::Repository(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
