use common::TradeId;
use thiserror::Error;

/// Errors that can occur when interacting with the trade repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No trade with this id is visible to the caller.
    #[error("Trade not found: {0}")]
    NotFound(TradeId),

    /// A trade with this id was already inserted.
    #[error("Trade already exists: {0}")]
    AlreadyExists(TradeId),

    /// The stored revision moved since the trade was read.
    #[error(
        "Concurrency conflict for trade {trade_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        trade_id: TradeId,
        expected: i64,
        actual: i64,
    },

    /// Some writes of a bulk update failed; the rest were applied.
    #[error(
        "Bulk update partially applied: {} succeeded, {} failed",
        applied.len(),
        failed.len()
    )]
    PartialBulkUpdate {
        applied: Vec<TradeId>,
        failed: Vec<(TradeId, String)>,
    },

    /// The pagination token could not be decoded.
    #[error("Invalid pagination token: {0}")]
    InvalidToken(String),

    /// A stored row could not be mapped back to a trade.
    #[error("Corrupted trade record: {0}")]
    Corrupted(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
