//! Historical store.
//!
//! The [`HistoryStore`] trait is the only write path into the history
//! tables and the `indexer_state` control row. Every history write is an
//! upsert on the record's natural key, so replaying an event converges to
//! the same rows.
//!
//! # Backends
//!
//! - [`PgHistoryStore`]: direct Postgres connection (the Supabase database)
//! - [`SupabaseHistoryStore`]: Supabase PostgREST over HTTPS
//! - [`InMemoryHistoryStore`]: process-local maps, for dry runs and tests

pub mod memory;
pub mod postgres;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_sdk::SettlementEvent;

use crate::events::{
    BetHistoryRecord, ContestHistoryRecord, EntryHistoryRecord, IndexerState,
    MarketHistoryRecord, OutcomeHistoryRecord, ProfileRecord, StateUpdate,
};

pub use memory::{AuditRow, InMemoryHistoryStore};
pub use postgres::PgHistoryStore;
pub use supabase::{SupabaseConfig, SupabaseHistoryStore};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// HTTP transport error talking to PostgREST.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// PostgREST answered with an error status.
    #[error("store API error [{status}]: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored or supplied value is out of range or malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The singleton control row is missing.
    #[error("indexer_state row not found")]
    StateMissing,
}

/// Persistence contract of the indexer.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Loads the `indexer_state` row.
    async fn load_state(&self) -> Result<IndexerState, StoreError>;

    /// Applies a partial update to the `indexer_state` row.
    async fn update_state(&self, update: &StateUpdate) -> Result<(), StoreError>;

    /// Inserts the raw event into `l2_events` with `processed = false`.
    ///
    /// Write-once: an existing row with the same transaction hash is left
    /// as it is.
    async fn record_event(&self, event: &SettlementEvent) -> Result<(), StoreError>;

    /// Marks an audit row processed and clears its error.
    async fn mark_event_processed(
        &self,
        transaction_hash: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Marks an audit row unprocessed with an error message.
    async fn mark_event_failed(&self, transaction_hash: &str, error: &str)
        -> Result<(), StoreError>;

    /// Returns the `processed` flag of an audit row, or `None` if the event
    /// was never recorded.
    async fn event_processed(&self, transaction_hash: &str) -> Result<Option<bool>, StoreError>;

    /// Upserts a market keyed by `market_id`.
    async fn upsert_market(&self, record: &MarketHistoryRecord) -> Result<(), StoreError>;

    /// Upserts outcomes keyed by `(market_id, outcome_id)`.
    async fn upsert_outcomes(&self, records: &[OutcomeHistoryRecord]) -> Result<(), StoreError>;

    /// Upserts a bet keyed by `bet_id`.
    async fn upsert_bet(&self, record: &BetHistoryRecord) -> Result<(), StoreError>;

    /// Upserts a contest keyed by `contest_id`.
    async fn upsert_contest(&self, record: &ContestHistoryRecord) -> Result<(), StoreError>;

    /// Upserts a contest entry keyed by `entry_id`.
    async fn upsert_entry(&self, record: &EntryHistoryRecord) -> Result<(), StoreError>;

    /// Ensures a profile row exists for the wallet.
    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError>;

    /// Returns true if the market is already in `market_history`.
    async fn has_market(&self, market_id: &str) -> Result<bool, StoreError>;

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Converts an unsigned counter to a BIGINT column value.
pub(crate) fn to_bigint(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} out of range: {}", field, value)))
}

/// Converts a BIGINT column value back to an unsigned counter.
pub(crate) fn from_bigint(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} is negative: {}", field, value)))
}
