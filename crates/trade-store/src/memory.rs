use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use common::{TradeId, UserId};
use domain::{TradeOffer, TradeStatus};
use tokio::sync::RwLock;

use crate::{
    RepositoryError, Result,
    store::{Pagination, TradePage, TradeRepository},
};

#[derive(Debug, Default)]
struct InMemoryState {
    trades: BTreeMap<TradeId, TradeOffer>,
    insert_calls: usize,
    update_calls: usize,
    bulk_update_calls: usize,
    fail_on_insert: bool,
    fail_on_update: bool,
    failing_ids: HashSet<TradeId>,
}

impl InMemoryState {
    fn apply_update(&mut self, trade: &mut TradeOffer) -> Result<()> {
        let id = trade.id();

        if self.fail_on_update || self.failing_ids.contains(&id) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let stored = self
            .trades
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;

        if stored.version() != trade.version() {
            return Err(RepositoryError::ConcurrencyConflict {
                trade_id: id,
                expected: trade.version(),
                actual: stored.version(),
            });
        }

        trade.mark_persisted();
        *stored = trade.clone();
        Ok(())
    }
}

/// In-memory trade repository for tests and local runs.
///
/// Keeps trades in a `BTreeMap` so listing walks ids in the same order the
/// PostgreSQL store does. Also counts write calls and can be told to fail
/// writes, which the saga tests use to check "no write happened" and
/// partial bulk failures.
#[derive(Clone, Default)]
pub struct InMemoryTradeRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryTradeRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored trades.
    pub async fn trade_count(&self) -> usize {
        self.state.read().await.trades.len()
    }

    /// Returns every stored trade in id order.
    pub async fn all(&self) -> Vec<TradeOffer> {
        self.state.read().await.trades.values().cloned().collect()
    }

    /// Returns a stored trade regardless of caller.
    pub async fn find(&self, id: TradeId) -> Option<TradeOffer> {
        self.state.read().await.trades.get(&id).cloned()
    }

    /// Number of `insert` calls, failed ones included.
    pub async fn insert_calls(&self) -> usize {
        self.state.read().await.insert_calls
    }

    /// Number of single `update` calls, failed ones included.
    pub async fn update_calls(&self) -> usize {
        self.state.read().await.update_calls
    }

    /// Number of `update_bulk` calls, failed ones included.
    pub async fn bulk_update_calls(&self) -> usize {
        self.state.read().await.bulk_update_calls
    }

    /// Total write calls of any kind.
    pub async fn write_calls(&self) -> usize {
        let state = self.state.read().await;
        state.insert_calls + state.update_calls + state.bulk_update_calls
    }

    /// Makes every following insert fail.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Makes every following update fail.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.state.write().await.fail_on_update = fail;
    }

    /// Makes updates of one specific trade fail.
    pub async fn fail_updates_for(&self, id: TradeId) {
        self.state.write().await.failing_ids.insert(id);
    }

    /// Clears all trades, counters and failure switches.
    pub async fn clear(&self) {
        *self.state.write().await = InMemoryState::default();
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn insert(&self, trade: &TradeOffer) -> Result<()> {
        let mut state = self.state.write().await;
        state.insert_calls += 1;

        if state.fail_on_insert {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        if state.trades.contains_key(&trade.id()) {
            return Err(RepositoryError::AlreadyExists(trade.id()));
        }

        state.trades.insert(trade.id(), trade.clone());
        Ok(())
    }

    async fn update(&self, trade: &mut TradeOffer) -> Result<()> {
        let mut state = self.state.write().await;
        state.update_calls += 1;
        state.apply_update(trade)
    }

    async fn update_bulk(&self, trades: &mut [TradeOffer]) -> Result<()> {
        let mut state = self.state.write().await;
        state.bulk_update_calls += 1;

        let mut applied = Vec::with_capacity(trades.len());
        let mut failed = Vec::new();

        for trade in trades.iter_mut() {
            match state.apply_update(trade) {
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

    async fn get(&self, caller_id: &UserId, pagination: &Pagination) -> Result<TradePage> {
        let page_size = pagination.effective_page_size();
        let lower = match pagination.cursor()? {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        let state = self.state.read().await;
        let trades: Vec<TradeOffer> = state
            .trades
            .range((lower, Bound::Unbounded))
            .map(|(_, trade)| trade)
            .filter(|trade| trade.is_party(caller_id))
            .take(page_size + 1)
            .cloned()
            .collect();

        Ok(TradePage::from_lookahead(trades, page_size))
    }

    async fn get_by_id(&self, caller_id: &UserId, id: TradeId) -> Result<TradeOffer> {
        let state = self.state.read().await;
        state
            .trades
            .get(&id)
            .filter(|trade| trade.is_party(caller_id))
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn get_by_ids(&self, ids: &[TradeId]) -> Result<Vec<TradeOffer>> {
        let state = self.state.read().await;
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| state.trades.get(id).cloned())
            .collect())
    }

    async fn get_by_status(&self, status: TradeStatus) -> Result<Vec<TradeOffer>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .values()
            .filter(|trade| trade.status() == status)
            .cloned()
            .collect())
    }
}
