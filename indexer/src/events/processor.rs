//! Event processor implementation.
//!
//! Records each settlement event in the audit log, projects it into the
//! history tables, and marks the audit row with the result.

use std::sync::Arc;

use chrono::Utc;
use prism_sdk::{EventPayload, ResolvedMarket, SettledContest, SettlementEvent};
use tracing::{debug, info, warn};

use super::types::{
    BetHistoryRecord, BetStatus, ContestHistoryRecord, EntryHistoryRecord, EntryResult,
    MarketHistoryRecord, OutcomeHistoryRecord, ProcessOutcome, ProfileRecord,
};
use crate::error::IndexerError;
use crate::source::SettlementSource;
use crate::store::HistoryStore;

/// Event processor for settlement events.
///
/// Every history write is an upsert, so processing the same event twice
/// converges to the same rows.
///
/// # Example
///
/// ```rust,ignore
/// use prism_indexer::events::EventProcessor;
///
/// let processor = EventProcessor::new(store, source);
/// let outcome = processor.process(&event).await?;
/// println!("settled {} bets", outcome.bets_settled());
/// ```
pub struct EventProcessor {
    store: Arc<dyn HistoryStore>,
    source: Arc<dyn SettlementSource>,
}

impl EventProcessor {
    /// Creates a processor writing to `store` and reading bets from `source`.
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>, source: Arc<dyn SettlementSource>) -> Self {
        Self { store, source }
    }

    /// Processes one event.
    ///
    /// The audit row is inserted first. On success it is marked processed;
    /// on failure it keeps `processed = false` with the error message and
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed, a bet lookup fails, or
    /// a store write fails.
    pub async fn process(&self, event: &SettlementEvent) -> Result<ProcessOutcome, IndexerError> {
        self.store.record_event(event).await?;

        match self.dispatch(event).await {
            Ok(outcome) => {
                self.store
                    .mark_event_processed(&event.transaction_hash, Utc::now())
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                self.mark_failed(&event.transaction_hash, &e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    /// Records a failure message on the audit row.
    ///
    /// A store error here is logged and dropped so it does not mask the
    /// processing error.
    pub async fn mark_failed(&self, transaction_hash: &str, message: &str) {
        if let Err(e) = self
            .store
            .mark_event_failed(transaction_hash, message)
            .await
        {
            warn!(tx = %transaction_hash, error = %e, "Failed to record event error");
        }
    }

    async fn dispatch(&self, event: &SettlementEvent) -> Result<ProcessOutcome, IndexerError> {
        match event.payload()? {
            EventPayload::MarketResolved(market) => self.settle_market(&market, event).await,
            EventPayload::ContestSettled(contest) => self.settle_contest(&contest, event).await,
            EventPayload::BetSettled(_) | EventPayload::Withdrawal(_) => {
                debug!(
                    tx = %event.transaction_hash,
                    event_type = %event.event_type,
                    "Audit-only event"
                );
                Ok(ProcessOutcome::Audited(event.event_type.clone()))
            }
            EventPayload::Unrecognized(name) => {
                debug!(tx = %event.transaction_hash, event_type = %name, "Ignoring event");
                Ok(ProcessOutcome::Ignored(event.event_type.clone()))
            }
        }
    }

    async fn settle_market(
        &self,
        market: &ResolvedMarket,
        event: &SettlementEvent,
    ) -> Result<ProcessOutcome, IndexerError> {
        // Nothing is written until every bet has been fetched and checked.
        let bets = self.source.fetch_bets(&market.id).await?;
        for bet in &bets {
            bet.validate()?;
        }

        let record = MarketHistoryRecord::from_resolved(market, event);
        let settled_at = record.resolved_at;
        self.store.upsert_market(&record).await?;

        let outcomes: Vec<_> = market
            .outcomes
            .iter()
            .map(|o| OutcomeHistoryRecord::from_snapshot(market, o))
            .collect();
        self.store.upsert_outcomes(&outcomes).await?;

        let mut bets_won = 0;
        let mut bets_lost = 0;

        for bet in &bets {
            self.ensure_profile(&bet.user_address).await?;

            let record = BetHistoryRecord::settle(bet, market, settled_at);
            match record.status {
                BetStatus::Won => bets_won += 1,
                BetStatus::Lost => bets_lost += 1,
            }
            self.store.upsert_bet(&record).await?;
        }

        info!(
            market_id = %market.id,
            winning_outcome = %market.winning_outcome,
            block = event.block_number,
            bets_won,
            bets_lost,
            "Market resolved"
        );

        Ok(ProcessOutcome::MarketResolved {
            market_id: market.id.clone(),
            outcomes: outcomes.len(),
            bets_won,
            bets_lost,
        })
    }

    async fn settle_contest(
        &self,
        contest: &SettledContest,
        event: &SettlementEvent,
    ) -> Result<ProcessOutcome, IndexerError> {
        self.store
            .upsert_contest(&ContestHistoryRecord::from_settled(contest, event))
            .await?;

        let mut winners = 0;
        for entry in &contest.entries {
            self.ensure_profile(&entry.user_address).await?;

            let record = EntryHistoryRecord::from_entry(contest, entry);
            if record.result == EntryResult::Win {
                winners += 1;
            }
            self.store.upsert_entry(&record).await?;
        }

        info!(
            contest_id = %contest.contest_id,
            block = event.block_number,
            entries = contest.entries.len(),
            winners,
            "Contest settled"
        );

        Ok(ProcessOutcome::ContestSettled {
            contest_id: contest.contest_id.clone(),
            entries: contest.entries.len(),
            winners,
        })
    }

    async fn ensure_profile(&self, wallet_address: &str) -> Result<(), IndexerError> {
        self.store
            .upsert_profile(&ProfileRecord::new(wallet_address))
            .await?;
        Ok(())
    }
}
