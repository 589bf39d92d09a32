use std::sync::Arc;

use async_trait::async_trait;
use common::{TradeId, UserId};
use domain::{TradeOffer, TradeStatus};

use crate::{RepositoryError, Result};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: usize = 100;

/// Cursor pagination request for listing trades.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Opaque cursor returned by the previous page; `None` starts from the beginning.
    pub token: Option<String>,

    /// Requested page size; `None` or 0 means [`DEFAULT_PAGE_SIZE`].
    pub page_size: Option<usize>,
}

impl Pagination {
    /// Creates a request for the first page with the default size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues after the given token.
    pub fn after(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Returns the page size to use, with defaults and the upper bound applied.
    pub fn effective_page_size(&self) -> usize {
        match self.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
        }
    }

    /// Decodes the token into the id after which the page starts.
    pub fn cursor(&self) -> Result<Option<TradeId>> {
        match self.token.as_deref() {
            None | Some("") => Ok(None),
            Some(token) => token
                .parse()
                .map(Some)
                .map_err(|_| RepositoryError::InvalidToken(token.to_string())),
        }
    }
}

/// One page of trades plus the cursor for the next one.
#[derive(Debug, Clone, Default)]
pub struct TradePage {
    pub trades: Vec<TradeOffer>,

    /// Id of the last trade on this page, present only when more trades follow.
    pub next_token: Option<String>,
}

impl TradePage {
    /// Builds a page from `page_size + 1` rows read in id order.
    ///
    /// The extra row only signals that another page exists; it is dropped.
    pub fn from_lookahead(mut trades: Vec<TradeOffer>, page_size: usize) -> Self {
        let has_more = trades.len() > page_size;
        trades.truncate(page_size);

        let next_token = if has_more {
            trades.last().map(|trade| trade.id().to_string())
        } else {
            None
        };

        Self { trades, next_token }
    }
}

/// Persistence operations the saga components need.
///
/// Writes are conditional on [`TradeOffer::version`]: an update only lands
/// if nobody else wrote the trade since it was read, and bumps the version
/// of the caller's copy on success.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Inserts a new trade.
    async fn insert(&self, trade: &TradeOffer) -> Result<()>;

    /// Writes the trade's status and `updated_at`.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version moved and with
    /// `NotFound` if the trade does not exist.
    async fn update(&self, trade: &mut TradeOffer) -> Result<()>;

    /// Writes several trades as independent point updates.
    ///
    /// This is not a transaction. Every trade is attempted; if any write
    /// fails the result is `PartialBulkUpdate` naming what was and was not
    /// applied.
    async fn update_bulk(&self, trades: &mut [TradeOffer]) -> Result<()> {
        let mut applied = Vec::with_capacity(trades.len());
        let mut failed = Vec::new();

        for trade in trades.iter_mut() {
            match self.update(trade).await {
                Ok(()) => applied.push(trade.id()),
                Err(e) => failed.push((trade.id(), e.to_string())),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::PartialBulkUpdate { applied, failed })
        }
    }

    /// Lists the caller's trades in ascending id order.
    async fn get(&self, caller_id: &UserId, pagination: &Pagination) -> Result<TradePage>;

    /// Loads one trade the caller is a party to.
    async fn get_by_id(&self, caller_id: &UserId, id: TradeId) -> Result<TradeOffer>;

    /// Loads every existing trade among `ids`; unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[TradeId]) -> Result<Vec<TradeOffer>>;

    /// Loads every trade currently in `status`.
    async fn get_by_status(&self, status: TradeStatus) -> Result<Vec<TradeOffer>>;
}

#[async_trait]
impl<T: TradeRepository + ?Sized> TradeRepository for Arc<T> {
    async fn insert(&self, trade: &TradeOffer) -> Result<()> {
        (**self).insert(trade).await
    }

    async fn update(&self, trade: &mut TradeOffer) -> Result<()> {
        (**self).update(trade).await
    }

    async fn update_bulk(&self, trades: &mut [TradeOffer]) -> Result<()> {
        (**self).update_bulk(trades).await
    }

    async fn get(&self, caller_id: &UserId, pagination: &Pagination) -> Result<TradePage> {
        (**self).get(caller_id, pagination).await
    }

    async fn get_by_id(&self, caller_id: &UserId, id: TradeId) -> Result<TradeOffer> {
        (**self).get_by_id(caller_id, id).await
    }

    async fn get_by_ids(&self, ids: &[TradeId]) -> Result<Vec<TradeOffer>> {
        (**self).get_by_ids(ids).await
    }

    async fn get_by_status(&self, status: TradeStatus) -> Result<Vec<TradeOffer>> {
        (**self).get_by_status(status).await
    }
}
