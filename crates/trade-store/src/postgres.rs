use async_trait::async_trait;
use common::{TradeId, UserId};
use domain::{Item, TradeOffer, TradeOfferRecord, TradeStatus};
use futures_util::TryStreamExt;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    RepositoryError, Result,
    store::{Pagination, TradePage, TradeRepository},
};

const TRADE_COLUMNS: &str = "id, owner_id, wanted_items_owner_id, status, offered_items, \
                             wanted_items, created_at, updated_at, version";

/// PostgreSQL-backed trade repository.
#[derive(Clone)]
pub struct PostgresTradeRepository {
    pool: PgPool,
}

impl PostgresTradeRepository {
    /// Creates a new PostgreSQL trade repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_trade(row: PgRow) -> Result<TradeOffer> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<TradeStatus>()
            .map_err(|e| RepositoryError::Corrupted(e.to_string()))?;

        let offered_items: Vec<Item> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("offered_items")?)?;
        let wanted_items: Vec<Item> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("wanted_items")?)?;

        Ok(TradeOffer::from(TradeOfferRecord {
            id: TradeId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner_id: UserId::new(row.try_get::<String, _>("owner_id")?),
            wanted_items_owner_id: UserId::new(row.try_get::<String, _>("wanted_items_owner_id")?),
            status,
            offered_items,
            wanted_items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        }))
    }

    /// Explains why a conditional update touched no row.
    async fn update_miss(&self, trade: &TradeOffer) -> RepositoryError {
        let stored: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM trades WHERE id = $1")
                .bind(trade.id().as_uuid())
                .fetch_optional(&self.pool)
                .await;

        match stored {
            Ok(Some(actual)) => RepositoryError::ConcurrencyConflict {
                trade_id: trade.id(),
                expected: trade.version(),
                actual,
            },
            Ok(None) => RepositoryError::NotFound(trade.id()),
            Err(e) => RepositoryError::Database(e),
        }
    }
}

#[async_trait]
impl TradeRepository for PostgresTradeRepository {
    async fn insert(&self, trade: &TradeOffer) -> Result<()> {
        let offered_items = serde_json::to_value(trade.offered_items())?;
        let wanted_items = serde_json::to_value(trade.wanted_items())?;

        sqlx::query(
            r#"
            INSERT INTO trades (id, owner_id, wanted_items_owner_id, status, offered_items, wanted_items, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trade.id().as_uuid())
        .bind(trade.owner_id().as_str())
        .bind(trade.wanted_items_owner_id().as_str())
        .bind(trade.status().as_str())
        .bind(offered_items)
        .bind(wanted_items)
        .bind(trade.created_at())
        .bind(trade.updated_at())
        .bind(trade.version())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::AlreadyExists(trade.id());
            }
            RepositoryError::Database(e)
        })?;

        tracing::debug!(trade_id = %trade.id(), "Inserted trade");
        Ok(())
    }

    async fn update(&self, trade: &mut TradeOffer) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET status = $2, updated_at = $3, version = version + 1
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(trade.id().as_uuid())
        .bind(trade.status().as_str())
        .bind(trade.updated_at())
        .bind(trade.version())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.update_miss(trade).await);
        }

        trade.mark_persisted();
        tracing::debug!(
            trade_id = %trade.id(),
            status = %trade.status(),
            version = trade.version(),
            "Updated trade"
        );
        Ok(())
    }

    async fn get(&self, caller_id: &UserId, pagination: &Pagination) -> Result<TradePage> {
        let page_size = pagination.effective_page_size();
        let cursor = pagination.cursor()?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE (owner_id = $1 OR wanted_items_owner_id = $1)
              AND ($2::uuid IS NULL OR id > $2)
            ORDER BY id ASC
            LIMIT $3
            "#
        ))
        .bind(caller_id.as_str())
        .bind(cursor.map(|id| id.as_uuid()))
        .bind((page_size + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let trades = rows
            .into_iter()
            .map(Self::row_to_trade)
            .collect::<Result<Vec<_>>>()?;

        Ok(TradePage::from_lookahead(trades, page_size))
    }

    async fn get_by_id(&self, caller_id: &UserId, id: TradeId) -> Result<TradeOffer> {
        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE id = $1 AND (owner_id = $2 OR wanted_items_owner_id = $2)
            "#
        ))
        .bind(id.as_uuid())
        .bind(caller_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_trade(row),
            None => Err(RepositoryError::NotFound(id)),
        }
    }

    async fn get_by_ids(&self, ids: &[TradeId]) -> Result<Vec<TradeOffer>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE id = ANY($1)
            "#
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        let mut found = rows
            .into_iter()
            .map(Self::row_to_trade)
            .collect::<Result<Vec<_>>>()?;

        // Keep the caller's order so batch handling is deterministic.
        found.sort_by_key(|trade| ids.iter().position(|id| *id == trade.id()));
        Ok(found)
    }

    async fn get_by_status(&self, status: TradeStatus) -> Result<Vec<TradeOffer>> {
        let sql = format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE status = $1
            ORDER BY created_at ASC, id ASC
            "#
        );

        let mut rows = sqlx::query(&sql).bind(status.as_str()).fetch(&self.pool);

        let mut trades = Vec::new();
        while let Some(row) = rows.try_next().await? {
            trades.push(Self::row_to_trade(row)?);
        }

        Ok(trades)
    }
}
