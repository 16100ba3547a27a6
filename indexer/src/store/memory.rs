//! In-memory history store.
//!
//! Keeps every table in a map keyed by the same natural key the SQL
//! backends upsert on, so replay behaves identically. Used by the
//! `memory` store mode (dry run) and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_sdk::SettlementEvent;
use tokio::sync::RwLock;

use super::{HistoryStore, StoreError};
use crate::events::{
    BetHistoryRecord, ContestHistoryRecord, EntryHistoryRecord, IndexerState,
    MarketHistoryRecord, OutcomeHistoryRecord, ProfileRecord, StateUpdate,
};

/// One row of the `l2_events` audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    /// The raw event as first recorded.
    pub event: SettlementEvent,
    /// Whether processing completed.
    pub processed: bool,
    /// When processing completed.
    pub processed_at: Option<DateTime<Utc>>,
    /// Last processing error.
    pub error_message: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    state: Option<IndexerState>,
    events: HashMap<String, AuditRow>,
    markets: HashMap<String, MarketHistoryRecord>,
    outcomes: HashMap<(String, String), OutcomeHistoryRecord>,
    bets: HashMap<String, BetHistoryRecord>,
    contests: HashMap<String, ContestHistoryRecord>,
    entries: HashMap<String, EntryHistoryRecord>,
    profiles: HashMap<String, ProfileRecord>,
    history_writes: u64,
}

/// History store backed by process memory.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryStore {
    /// Creates a store with a seeded, zeroed `indexer_state` row.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(IndexerState::default())
    }

    /// Creates a store whose `indexer_state` row starts at `state`.
    #[must_use]
    pub fn with_state(state: IndexerState) -> Self {
        Self {
            tables: RwLock::new(Tables {
                state: Some(state),
                ..Default::default()
            }),
        }
    }

    /// Creates a store with no `indexer_state` row.
    #[must_use]
    pub fn unseeded() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Returns the control row, if seeded.
    pub async fn state(&self) -> Option<IndexerState> {
        self.tables.read().await.state.clone()
    }

    /// Returns the audit row for a transaction.
    pub async fn audit_row(&self, transaction_hash: &str) -> Option<AuditRow> {
        self.tables.read().await.events.get(transaction_hash).cloned()
    }

    /// Returns the number of audit rows.
    pub async fn audit_len(&self) -> usize {
        self.tables.read().await.events.len()
    }

    /// Returns a market history row.
    pub async fn market(&self, market_id: &str) -> Option<MarketHistoryRecord> {
        self.tables.read().await.markets.get(market_id).cloned()
    }

    /// Returns all outcome rows of a market, sorted by outcome id.
    pub async fn outcomes(&self, market_id: &str) -> Vec<OutcomeHistoryRecord> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .outcomes
            .values()
            .filter(|o| o.market_id == market_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.outcome_id.cmp(&b.outcome_id));
        rows
    }

    /// Returns a bet history row.
    pub async fn bet(&self, bet_id: &str) -> Option<BetHistoryRecord> {
        self.tables.read().await.bets.get(bet_id).cloned()
    }

    /// Returns all bet history rows, sorted by bet id.
    pub async fn bets(&self) -> Vec<BetHistoryRecord> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables.bets.values().cloned().collect();
        rows.sort_by(|a, b| a.bet_id.cmp(&b.bet_id));
        rows
    }

    /// Returns a contest history row.
    pub async fn contest(&self, contest_id: &str) -> Option<ContestHistoryRecord> {
        self.tables.read().await.contests.get(contest_id).cloned()
    }

    /// Returns a contest entry history row.
    pub async fn entry(&self, entry_id: &str) -> Option<EntryHistoryRecord> {
        self.tables.read().await.entries.get(entry_id).cloned()
    }

    /// Returns true if a profile exists for the wallet.
    pub async fn has_profile(&self, wallet_address: &str) -> bool {
        self.tables
            .read()
            .await
            .profiles
            .contains_key(wallet_address)
    }

    /// Returns the number of rows across all history tables.
    pub async fn history_len(&self) -> usize {
        let t = self.tables.read().await;
        t.markets.len()
            + t.outcomes.len()
            + t.bets.len()
            + t.contests.len()
            + t.entries.len()
            + t.profiles.len()
    }

    /// Returns the number of history upserts performed, including replays.
    pub async fn history_writes(&self) -> u64 {
        self.tables.read().await.history_writes
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load_state(&self) -> Result<IndexerState, StoreError> {
        self.tables
            .read()
            .await
            .state
            .clone()
            .ok_or(StoreError::StateMissing)
    }

    async fn update_state(&self, update: &StateUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let state = tables.state.as_mut().ok_or(StoreError::StateMissing)?;
        state.apply(update);
        Ok(())
    }

    async fn record_event(&self, event: &SettlementEvent) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .events
            .entry(event.transaction_hash.clone())
            .or_insert_with(|| AuditRow {
                event: event.clone(),
                processed: false,
                processed_at: None,
                error_message: None,
            });
        Ok(())
    }

    async fn mark_event_processed(
        &self,
        transaction_hash: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.events.get_mut(transaction_hash) {
            row.processed = true;
            row.processed_at = Some(processed_at);
            row.error_message = None;
        }
        Ok(())
    }

    async fn mark_event_failed(
        &self,
        transaction_hash: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.events.get_mut(transaction_hash) {
            row.processed = false;
            row.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn event_processed(&self, transaction_hash: &str) -> Result<Option<bool>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .events
            .get(transaction_hash)
            .map(|row| row.processed))
    }

    async fn upsert_market(&self, record: &MarketHistoryRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.history_writes += 1;
        tables
            .markets
            .insert(record.market_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_outcomes(&self, records: &[OutcomeHistoryRecord]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for record in records {
            tables.history_writes += 1;
            tables.outcomes.insert(
                (record.market_id.clone(), record.outcome_id.clone()),
                record.clone(),
            );
        }
        Ok(())
    }

    async fn upsert_bet(&self, record: &BetHistoryRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.history_writes += 1;
        tables.bets.insert(record.bet_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_contest(&self, record: &ContestHistoryRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.history_writes += 1;
        tables
            .contests
            .insert(record.contest_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_entry(&self, record: &EntryHistoryRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.history_writes += 1;
        tables.entries.insert(record.entry_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.history_writes += 1;
        tables
            .profiles
            .entry(record.wallet_address.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn has_market(&self, market_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.markets.contains_key(market_id))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use prism_sdk::EventType;
    use rust_decimal::Decimal;
    use serde_json::Value;

    use super::*;
    use crate::events::{BetStatus, IndexerStatus};

    fn event(tx: &str) -> SettlementEvent {
        SettlementEvent::new(
            EventType::BetSettled,
            1,
            tx,
            "2025-01-01T00:00:00Z",
            Value::Null,
        )
    }

    fn bet(payout: i64) -> BetHistoryRecord {
        BetHistoryRecord {
            bet_id: "b1".to_string(),
            market_id: "m1".to_string(),
            user_address: "u1".to_string(),
            outcome_id: "Yes".to_string(),
            amount: Decimal::from(10),
            odds: None,
            potential_payout: Decimal::from(20),
            payout_amount: Decimal::from(payout),
            status: BetStatus::Won,
            placed_at: None,
            settled_at: None,
        }
    }

    #[tokio::test]
    async fn test_memory_state_seeded() {
        let store = InMemoryHistoryStore::new();
        let state = store.load_state().await.expect("state");
        assert_eq!(state, IndexerState::default());

        store
            .update_state(&StateUpdate::status(IndexerStatus::Paused))
            .await
            .expect("update");
        assert_eq!(
            store.state().await.map(|s| s.status),
            Some(IndexerStatus::Paused)
        );
    }

    #[tokio::test]
    async fn test_memory_state_missing() {
        let store = InMemoryHistoryStore::unseeded();
        assert!(matches!(
            store.load_state().await,
            Err(StoreError::StateMissing)
        ));
        assert!(store
            .update_state(&StateUpdate::status(IndexerStatus::Paused))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_memory_audit_log_is_write_once() {
        let store = InMemoryHistoryStore::new();
        store.record_event(&event("tx1")).await.expect("record");
        store
            .mark_event_failed("tx1", "l2 timeout")
            .await
            .expect("fail");

        // Re-recording keeps the failed row as it is.
        store.record_event(&event("tx1")).await.expect("record");
        let row = store.audit_row("tx1").await.expect("row");
        assert!(!row.processed);
        assert_eq!(row.error_message.as_deref(), Some("l2 timeout"));
        assert_eq!(store.event_processed("tx1").await.expect("lookup"), Some(false));
        assert_eq!(store.event_processed("tx2").await.expect("lookup"), None);

        store
            .mark_event_processed("tx1", Utc::now())
            .await
            .expect("processed");
        let row = store.audit_row("tx1").await.expect("row");
        assert!(row.processed);
        assert!(row.error_message.is_none());
        assert_eq!(store.event_processed("tx1").await.expect("lookup"), Some(true));
        assert_eq!(store.audit_len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces_by_key() {
        let store = InMemoryHistoryStore::new();
        store.upsert_bet(&bet(0)).await.expect("upsert");
        store.upsert_bet(&bet(20)).await.expect("upsert");

        assert_eq!(store.bets().await.len(), 1);
        assert_eq!(
            store.bet("b1").await.map(|b| b.payout_amount),
            Some(Decimal::from(20))
        );
        assert_eq!(store.history_writes().await, 2);
    }

    #[tokio::test]
    async fn test_memory_profiles_are_deduplicated() {
        let store = InMemoryHistoryStore::new();
        store
            .upsert_profile(&ProfileRecord::new("u1"))
            .await
            .expect("upsert");
        store
            .upsert_profile(&ProfileRecord::new("u1"))
            .await
            .expect("upsert");

        assert!(store.has_profile("u1").await);
        assert_eq!(store.history_len().await, 1);
    }
}
