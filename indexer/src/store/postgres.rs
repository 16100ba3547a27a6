//! PostgreSQL history store with runtime queries (no compile-time checking).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_sdk::SettlementEvent;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{from_bigint, to_bigint, HistoryStore, StoreError};
use crate::events::{
    BetHistoryRecord, ContestHistoryRecord, EntryHistoryRecord, IndexerState, IndexerStatus,
    MarketHistoryRecord, OutcomeHistoryRecord, ProfileRecord, StateUpdate,
};

const UPDATE_STATE: &str = r#"
    UPDATE indexer_state SET
        last_synced_block = COALESCE($1, last_synced_block),
        last_synced_at = COALESCE($2, last_synced_at),
        total_events_processed = COALESCE($3, total_events_processed),
        status = COALESCE($4, status),
        error_message = CASE WHEN $5 THEN $6 ELSE error_message END,
        updated_at = NOW()
    WHERE id = 1
"#;

const UPSERT_MARKET: &str = r#"
    INSERT INTO market_history (
        market_id, title, description, category, status, resolved_outcome,
        total_volume, total_liquidity, total_bets, created_at, resolved_at,
        resolution_tx_hash, resolution_block
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (market_id) DO UPDATE SET
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        category = EXCLUDED.category,
        status = EXCLUDED.status,
        resolved_outcome = EXCLUDED.resolved_outcome,
        total_volume = EXCLUDED.total_volume,
        total_liquidity = EXCLUDED.total_liquidity,
        total_bets = EXCLUDED.total_bets,
        created_at = EXCLUDED.created_at,
        resolved_at = EXCLUDED.resolved_at,
        resolution_tx_hash = EXCLUDED.resolution_tx_hash,
        resolution_block = EXCLUDED.resolution_block
"#;

const UPSERT_OUTCOME: &str = r#"
    INSERT INTO market_outcome_history (
        market_id, outcome_id, label, final_odds, final_liquidity, total_volume, is_winner
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (market_id, outcome_id) DO UPDATE SET
        label = EXCLUDED.label,
        final_odds = EXCLUDED.final_odds,
        final_liquidity = EXCLUDED.final_liquidity,
        total_volume = EXCLUDED.total_volume,
        is_winner = EXCLUDED.is_winner
"#;

const UPSERT_BET: &str = r#"
    INSERT INTO bet_history (
        bet_id, market_id, user_address, outcome_id, amount, odds,
        potential_payout, payout_amount, status, placed_at, settled_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (bet_id) DO UPDATE SET
        market_id = EXCLUDED.market_id,
        user_address = EXCLUDED.user_address,
        outcome_id = EXCLUDED.outcome_id,
        amount = EXCLUDED.amount,
        odds = EXCLUDED.odds,
        potential_payout = EXCLUDED.potential_payout,
        payout_amount = EXCLUDED.payout_amount,
        status = EXCLUDED.status,
        placed_at = EXCLUDED.placed_at,
        settled_at = EXCLUDED.settled_at
"#;

const UPSERT_CONTEST: &str = r#"
    INSERT INTO contest_history (
        contest_id, title, status, winners, payout_structure, prize_pool,
        oracle_proof, oracle_signature, settled_at, settlement_tx_hash, settlement_block
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (contest_id) DO UPDATE SET
        title = EXCLUDED.title,
        status = EXCLUDED.status,
        winners = EXCLUDED.winners,
        payout_structure = EXCLUDED.payout_structure,
        prize_pool = EXCLUDED.prize_pool,
        oracle_proof = EXCLUDED.oracle_proof,
        oracle_signature = EXCLUDED.oracle_signature,
        settled_at = EXCLUDED.settled_at,
        settlement_tx_hash = EXCLUDED.settlement_tx_hash,
        settlement_block = EXCLUDED.settlement_block
"#;

const UPSERT_ENTRY: &str = r#"
    INSERT INTO contest_entry_history (
        entry_id, contest_id, user_address, result, final_rank, payout_amount, score
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (entry_id) DO UPDATE SET
        contest_id = EXCLUDED.contest_id,
        user_address = EXCLUDED.user_address,
        result = EXCLUDED.result,
        final_rank = EXCLUDED.final_rank,
        payout_amount = EXCLUDED.payout_amount,
        score = EXCLUDED.score
"#;

/// History store on a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Connects a pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Applies the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn rank_to_int(rank: Option<u32>) -> Result<Option<i32>, StoreError> {
    rank.map(|r| {
        i32::try_from(r).map_err(|_| StoreError::InvalidData(format!("rank out of range: {}", r)))
    })
    .transpose()
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn load_state(&self) -> Result<IndexerState, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT last_synced_block, last_synced_at, total_events_processed, status, error_message
            FROM indexer_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::StateMissing)?;

        let status: String = row.try_get("status")?;

        Ok(IndexerState {
            last_synced_block: from_bigint(row.try_get("last_synced_block")?, "last_synced_block")?,
            last_synced_at: row.try_get("last_synced_at")?,
            total_events_processed: from_bigint(
                row.try_get("total_events_processed")?,
                "total_events_processed",
            )?,
            status: status
                .parse::<IndexerStatus>()
                .map_err(StoreError::InvalidData)?,
            error_message: row.try_get("error_message")?,
        })
    }

    async fn update_state(&self, update: &StateUpdate) -> Result<(), StoreError> {
        let last_synced_block = update
            .last_synced_block
            .map(|b| to_bigint(b, "last_synced_block"))
            .transpose()?;
        let total = update
            .total_events_processed
            .map(|t| to_bigint(t, "total_events_processed"))
            .transpose()?;

        let result = sqlx::query(UPDATE_STATE)
            .bind(last_synced_block)
            .bind(update.last_synced_at)
            .bind(total)
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.error_message.is_some())
            .bind(update.error_message.clone().flatten())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StateMissing);
        }
        Ok(())
    }

    async fn record_event(&self, event: &SettlementEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO l2_events (
                transaction_hash, event_type, block_number, event_timestamp, data, processed
            ) VALUES ($1, $2, $3, $4, $5, FALSE)
            ON CONFLICT (transaction_hash) DO NOTHING
            "#,
        )
        .bind(&event.transaction_hash)
        .bind(event.event_type.as_str())
        .bind(to_bigint(event.block_number, "block_number")?)
        .bind(&event.timestamp)
        .bind(Json(&event.data))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_event_processed(
        &self,
        transaction_hash: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE l2_events
            SET processed = TRUE,
                processed_at = $1,
                error_message = NULL
            WHERE transaction_hash = $2
            "#,
        )
        .bind(processed_at)
        .bind(transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_event_failed(
        &self,
        transaction_hash: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE l2_events
            SET processed = FALSE,
                error_message = $1
            WHERE transaction_hash = $2
            "#,
        )
        .bind(error)
        .bind(transaction_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn event_processed(&self, transaction_hash: &str) -> Result<Option<bool>, StoreError> {
        let row = sqlx::query("SELECT processed FROM l2_events WHERE transaction_hash = $1")
            .bind(transaction_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.try_get::<bool, _>("processed"))
            .transpose()?)
    }

    async fn upsert_market(&self, record: &MarketHistoryRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT_MARKET)
            .bind(&record.market_id)
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.category)
            .bind(&record.status)
            .bind(&record.resolved_outcome)
            .bind(record.total_volume)
            .bind(record.total_liquidity)
            .bind(to_bigint(record.total_bets, "total_bets")?)
            .bind(record.created_at)
            .bind(record.resolved_at)
            .bind(&record.resolution_tx_hash)
            .bind(to_bigint(record.resolution_block, "resolution_block")?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_outcomes(&self, records: &[OutcomeHistoryRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(UPSERT_OUTCOME)
                .bind(&record.market_id)
                .bind(&record.outcome_id)
                .bind(&record.label)
                .bind(record.final_odds)
                .bind(record.final_liquidity)
                .bind(record.total_volume)
                .bind(record.is_winner)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_bet(&self, record: &BetHistoryRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT_BET)
            .bind(&record.bet_id)
            .bind(&record.market_id)
            .bind(&record.user_address)
            .bind(&record.outcome_id)
            .bind(record.amount)
            .bind(record.odds)
            .bind(record.potential_payout)
            .bind(record.payout_amount)
            .bind(record.status.as_str())
            .bind(record.placed_at)
            .bind(record.settled_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_contest(&self, record: &ContestHistoryRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT_CONTEST)
            .bind(&record.contest_id)
            .bind(&record.title)
            .bind(&record.status)
            .bind(&record.winners)
            .bind(Json(&record.payout_structure))
            .bind(record.prize_pool)
            .bind(&record.oracle_proof)
            .bind(&record.oracle_signature)
            .bind(record.settled_at)
            .bind(&record.settlement_tx_hash)
            .bind(to_bigint(record.settlement_block, "settlement_block")?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_entry(&self, record: &EntryHistoryRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT_ENTRY)
            .bind(&record.entry_id)
            .bind(&record.contest_id)
            .bind(&record.user_address)
            .bind(record.result.as_str())
            .bind(rank_to_int(record.final_rank)?)
            .bind(record.payout_amount)
            .bind(record.score)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (wallet_address)
            VALUES ($1)
            ON CONFLICT (wallet_address) DO NOTHING
            "#,
        )
        .bind(&record.wallet_address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_market(&self, market_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM market_history WHERE market_id = $1)")
            .bind(market_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
