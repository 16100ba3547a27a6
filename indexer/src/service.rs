//! Main indexer service.
//!
//! Drives the sync loop: load the cursor, fetch settlements, process them
//! in order, and persist the new cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::events::{EventProcessor, IndexerMetrics, IndexerState, IndexerStatus, StateUpdate};
use crate::feed::{EventFeed, FeedOrigin};
use crate::source::SettlementSource;
use crate::store::HistoryStore;

/// Result of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was still running.
    Skipped,
    /// No new settlements.
    Idle,
    /// A batch was processed and the cursor persisted.
    Synced {
        /// Events processed in this cycle.
        events: u64,
        /// Cursor after the cycle.
        last_block: u64,
    },
}

/// Clears the running flag when dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The settlement indexer service.
pub struct IndexerService {
    /// Historical store.
    store: Arc<dyn HistoryStore>,

    /// Settlement feed with fallback.
    feed: EventFeed,

    /// Event processor.
    processor: EventProcessor,

    /// Metrics.
    metrics: Arc<IndexerMetrics>,

    /// Poll interval.
    poll_interval: Duration,

    /// Failures before an event is dead-lettered; 0 never gives up.
    max_event_attempts: u32,

    /// Whether a sync cycle is in progress.
    running: AtomicBool,

    /// Consecutive failures per transaction hash.
    failures: Mutex<HashMap<String, u32>>,

    /// Last state loaded from the store.
    last_state: Mutex<Option<IndexerState>>,

    /// Wakes the run loop on stop.
    shutdown: Notify,

    /// True while the run loop owns cycles.
    looping: watch::Sender<bool>,
}

impl IndexerService {
    /// Creates a new indexer service.
    #[must_use]
    pub fn new(
        config: &IndexerConfig,
        store: Arc<dyn HistoryStore>,
        source: Arc<dyn SettlementSource>,
    ) -> Self {
        Self {
            feed: EventFeed::new(Arc::clone(&source), Arc::clone(&store)),
            processor: EventProcessor::new(Arc::clone(&store), source),
            store,
            metrics: Arc::new(IndexerMetrics::new()),
            poll_interval: config.poll_interval(),
            max_event_attempts: config.max_event_attempts,
            running: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            last_state: Mutex::new(None),
            shutdown: Notify::new(),
            looping: watch::Sender::new(false),
        }
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<IndexerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Returns true while a sync cycle is in progress.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one sync cycle.
    ///
    /// Returns [`SyncOutcome::Skipped`] without doing anything if another
    /// cycle is in progress. On failure the state row is set to `error`
    /// and the cursor is left where it was.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the cycle.
    pub async fn sync_once(&self) -> Result<SyncOutcome, IndexerError> {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            self.metrics.record_skipped_tick();
            debug!("Previous sync still running, skipping tick");
            return Ok(SyncOutcome::Skipped);
        };

        let start = Instant::now();
        let result = self.sync_cycle().await;
        self.metrics.record_cycle(start.elapsed());

        if let Err(ref e) = result {
            self.metrics.record_failure();
            error!(error = %e, "Sync failed");

            let update = StateUpdate::failed(e.to_string());
            if let Err(store_err) = self.store.update_state(&update).await {
                warn!(error = %store_err, "Failed to persist error state");
            }
        }

        result
    }

    async fn sync_cycle(&self) -> Result<SyncOutcome, IndexerError> {
        let state = self.load_state().await;
        let mut cursor = state.cursor();

        let batch = self.feed.fetch(cursor.from_block()).await?;
        if batch.origin == FeedOrigin::Fallback {
            self.metrics.record_fallback();
        }

        if batch.is_empty() {
            info!(from_block = cursor.from_block(), "No new settlements");
            return Ok(SyncOutcome::Idle);
        }

        debug!(
            count = batch.events.len(),
            origin = ?batch.origin,
            from_block = cursor.from_block(),
            "Processing settlements"
        );

        for event in &batch.events {
            let tx = event.transaction_hash.as_str();

            if batch.origin == FeedOrigin::Primary && cursor.is_synced(event.block_number) {
                debug!(tx, block = event.block_number, "Already synced, skipping");
                self.metrics.record_event_skipped();
                continue;
            }

            match self.processor.process(event).await {
                Ok(outcome) => {
                    self.failures.lock().await.remove(tx);
                    self.metrics.record_outcome(&outcome);
                    cursor.mark_processed(event.block_number);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        tx,
                        block = event.block_number,
                        error = %e,
                        "Event failed, L2 unavailable"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let attempts = self.record_attempt(tx).await;
                    if self.max_event_attempts == 0 || attempts < self.max_event_attempts {
                        warn!(tx, block = event.block_number, attempts, error = %e, "Event failed");
                        return Err(e);
                    }

                    // The count is kept so a re-served event is dead-lettered
                    // again at once.
                    let message = format!("dead-lettered after {} attempts: {}", attempts, e);
                    error!(tx, block = event.block_number, "{}", message);
                    self.processor.mark_failed(tx, &message).await;
                    self.metrics.record_dead_letter();
                    cursor.advance(event.block_number);
                }
            }
        }

        let total = state
            .total_events_processed
            .saturating_add(cursor.events_processed);
        let update = StateUpdate::synced(cursor.last_synced_block, Utc::now(), total);
        self.store.update_state(&update).await?;

        if let Some(cached) = self.last_state.lock().await.as_mut() {
            cached.apply(&update);
        }

        info!(
            events = cursor.events_processed,
            last_block = cursor.last_synced_block,
            "Sync complete"
        );

        Ok(SyncOutcome::Synced {
            events: cursor.events_processed,
            last_block: cursor.last_synced_block,
        })
    }

    /// Loads the state row, falling back to the last good state or a
    /// zeroed default.
    async fn load_state(&self) -> IndexerState {
        match self.store.load_state().await {
            Ok(state) => {
                *self.last_state.lock().await = Some(state.clone());
                state
            }
            Err(e) => {
                let cached = self.last_state.lock().await.clone();
                warn!(
                    error = %e,
                    cached = cached.is_some(),
                    "Failed to load indexer state, using fallback"
                );
                cached.unwrap_or_default()
            }
        }
    }

    async fn record_attempt(&self, transaction_hash: &str) -> u32 {
        let mut failures = self.failures.lock().await;
        let attempts = failures.entry(transaction_hash.to_string()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        *attempts
    }

    /// Runs the sync loop until [`stop`](Self::stop) is called.
    ///
    /// Syncs once immediately, then on every tick of the poll interval.
    /// Each cycle runs in its own task; ticks that find a cycle still
    /// running are dropped. Cycles in flight when the loop exits are
    /// aborted and joined before this returns.
    pub async fn run(self: Arc<Self>) {
        info!(
            backend = self.store.backend_name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Indexer service started"
        );

        self.looping.send_replace(true);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                _ = interval.tick() => {
                    let service = Arc::clone(&self);
                    // Failures are logged and persisted by sync_once.
                    in_flight.spawn(async move {
                        let _ = service.sync_once().await;
                    });
                }
            }
        }

        in_flight.shutdown().await;
        self.looping.send_replace(false);
        info!("Indexer service stopped");
    }

    /// Stops the run loop and marks the state row `paused`.
    ///
    /// Waits for the loop to abort its in-flight cycles first, so no cycle
    /// can write `running` over `paused`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state row cannot be updated.
    pub async fn stop(&self) -> Result<(), IndexerError> {
        info!("Indexer service stop requested");
        self.shutdown.notify_one();

        // The sender lives in `self`, so the channel cannot close here.
        let _ = self.looping.subscribe().wait_for(|looping| !*looping).await;

        self.store
            .update_state(&StateUpdate::status(IndexerStatus::Paused))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::DateTime;
    use prism_sdk::{Bet, ClientError, EventType, ResolvedMarket, SettlementEvent};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::events::{
        BetHistoryRecord, ContestHistoryRecord, EntryHistoryRecord, MarketHistoryRecord,
        OutcomeHistoryRecord, ProfileRecord,
    };
    use crate::store::{InMemoryHistoryStore, StoreError};

    /// Serves events at or after the requested block, like the L2 does.
    #[derive(Default)]
    struct ScriptedSource {
        events: std::sync::Mutex<Vec<SettlementEvent>>,
        feed_down: bool,
        bets_down: bool,
        bets_timeout: bool,
        gate: Option<Arc<Notify>>,
        feed_calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with_events(events: Vec<SettlementEvent>) -> Self {
            Self {
                events: std::sync::Mutex::new(events),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SettlementSource for ScriptedSource {
        async fn fetch_settlement_events(
            &self,
            from_block: u64,
        ) -> Result<Vec<SettlementEvent>, ClientError> {
            self.feed_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            if self.feed_down {
                return Err(ClientError::Timeout);
            }
            let events = self.events.lock().expect("events lock");
            Ok(events
                .iter()
                .filter(|e| e.block_number >= from_block)
                .cloned()
                .collect())
        }

        async fn fetch_resolved_markets(&self) -> Result<Vec<ResolvedMarket>, ClientError> {
            if self.feed_down {
                return Err(ClientError::Timeout);
            }
            Ok(Vec::new())
        }

        async fn fetch_bets(&self, _market_id: &str) -> Result<Vec<Bet>, ClientError> {
            if self.bets_timeout {
                return Err(ClientError::Timeout);
            }
            if self.bets_down {
                return Err(ClientError::Api {
                    code: "500".to_string(),
                    message: "bets unavailable".to_string(),
                });
            }
            Ok(Vec::new())
        }
    }

    fn withdrawal(tx: &str, block: u64) -> SettlementEvent {
        SettlementEvent::new(
            EventType::Withdrawal,
            block,
            tx,
            "2025-01-01T00:00:00Z",
            json!({"user_address": "u1", "amount": 1}),
        )
    }

    fn resolution(tx: &str, block: u64) -> SettlementEvent {
        SettlementEvent::new(
            EventType::MarketResolved,
            block,
            tx,
            "2025-01-01T00:00:00Z",
            json!({"id": "m1", "winning_outcome": "Yes", "outcomes": []}),
        )
    }

    fn service_with(
        source: ScriptedSource,
        store: Arc<dyn HistoryStore>,
        max_event_attempts: u32,
    ) -> IndexerService {
        let config = IndexerConfig {
            max_event_attempts,
            ..Default::default()
        };
        IndexerService::new(&config, store, Arc::new(source))
    }

    #[tokio::test]
    async fn test_sync_idle_when_no_events() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let service = service_with(ScriptedSource::default(), store.clone(), 5);

        assert_eq!(assert_ok!(service.sync_once().await), SyncOutcome::Idle);
        assert!(!service.is_syncing());
        assert_eq!(store.state().await.map(|s| s.last_synced_block), Some(0));
    }

    #[tokio::test]
    async fn test_sync_advances_cursor_to_max_block() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource::with_events(vec![
            withdrawal("tx10", 10),
            withdrawal("tx5", 5),
            withdrawal("tx12", 12),
        ]);
        let service = service_with(source, store.clone(), 5);

        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 3,
                last_block: 12
            }
        );

        let state = store.state().await.expect("state");
        assert_eq!(state.last_synced_block, 12);
        assert_eq!(state.total_events_processed, 3);
        assert_eq!(state.status, IndexerStatus::Running);
        assert!(state.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_sync_skips_covered_blocks_and_never_moves_back() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource::with_events(vec![withdrawal("tx12", 12)]);
        let service = service_with(source, store.clone(), 5);
        assert_ok!(service.sync_once().await);

        // The feed re-serves block 12 (from_block is inclusive).
        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 0,
                last_block: 12
            }
        );
        assert_eq!(service.metrics().events_skipped(), 1);

        let state = store.state().await.expect("state");
        assert_eq!(state.last_synced_block, 12);
        assert_eq!(state.total_events_processed, 1);
    }

    #[tokio::test]
    async fn test_sync_failure_sets_error_and_keeps_cursor() {
        let store = Arc::new(InMemoryHistoryStore::with_state(IndexerState {
            last_synced_block: 3,
            ..Default::default()
        }));
        let source = ScriptedSource {
            bets_down: true,
            ..ScriptedSource::with_events(vec![withdrawal("tx4", 4), resolution("tx5", 5)])
        };
        let service = service_with(source, store.clone(), 5);

        assert_err!(service.sync_once().await);
        assert!(!service.is_syncing());

        let state = store.state().await.expect("state");
        assert_eq!(state.last_synced_block, 3);
        assert_eq!(state.status, IndexerStatus::Error);
        assert!(state
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("bets unavailable")));

        let row = store.audit_row("tx5").await.expect("audit");
        assert!(!row.processed);
        assert_eq!(service.metrics().sync_failures(), 1);
    }

    #[tokio::test]
    async fn test_sync_unavailable_feed_sets_error() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            feed_down: true,
            ..Default::default()
        };
        let service = service_with(source, store.clone(), 5);

        let err = assert_err!(service.sync_once().await);
        assert!(matches!(err, IndexerError::Fetch(_)));
        assert_eq!(
            store.state().await.map(|s| s.status),
            Some(IndexerStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_poison_event_is_dead_lettered() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            bets_down: true,
            ..ScriptedSource::with_events(vec![resolution("tx7", 7), withdrawal("tx8", 8)])
        };
        let service = service_with(source, store.clone(), 2);

        assert_err!(service.sync_once().await);
        assert_eq!(store.state().await.map(|s| s.last_synced_block), Some(0));

        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 1,
                last_block: 8
            }
        );

        let row = store.audit_row("tx7").await.expect("audit");
        assert!(!row.processed);
        assert!(row
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("dead-lettered after 2 attempts:")));
        assert!(store.audit_row("tx8").await.expect("audit").processed);
        assert_eq!(service.metrics().dead_letters(), 1);
    }

    #[tokio::test]
    async fn test_reserved_dead_letter_fails_fast() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            bets_down: true,
            ..ScriptedSource::with_events(vec![resolution("tx7", 7)])
        };
        let service = service_with(source, store.clone(), 2);

        assert_err!(service.sync_once().await);
        assert_ok!(service.sync_once().await);

        // Rewound cursor re-serves tx7; it is dead-lettered again at once.
        assert_ok!(
            store
                .update_state(&StateUpdate {
                    last_synced_block: Some(0),
                    ..Default::default()
                })
                .await
        );
        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 0,
                last_block: 7
            }
        );
        assert_eq!(service.metrics().dead_letters(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_never_dead_lettered() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            bets_timeout: true,
            ..ScriptedSource::with_events(vec![resolution("tx7", 7), withdrawal("tx8", 8)])
        };
        let service = service_with(source, store.clone(), 2);

        for _ in 0..4 {
            let err = assert_err!(service.sync_once().await);
            assert!(err.is_transient());
        }

        assert_eq!(store.state().await.map(|s| s.last_synced_block), Some(0));
        assert!(store.audit_row("tx8").await.is_none());
        assert_eq!(service.metrics().dead_letters(), 0);
    }

    #[tokio::test]
    async fn test_zero_attempts_blocks_forever() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            bets_down: true,
            ..ScriptedSource::with_events(vec![resolution("tx7", 7)])
        };
        let service = service_with(source, store.clone(), 0);

        for _ in 0..4 {
            assert_err!(service.sync_once().await);
        }
        assert_eq!(store.state().await.map(|s| s.last_synced_block), Some(0));
        assert_eq!(service.metrics().dead_letters(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_sync_is_skipped() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            gate: Some(Arc::clone(&gate)),
            ..ScriptedSource::with_events(vec![withdrawal("tx1", 1)])
        };
        let service = Arc::new(service_with(source, store.clone(), 5));

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.sync_once().await })
        };
        while !service.is_syncing() {
            tokio::task::yield_now().await;
        }

        assert_eq!(assert_ok!(service.sync_once().await), SyncOutcome::Skipped);
        assert_eq!(service.metrics().skipped_ticks(), 1);

        gate.notify_one();
        let outcome = assert_ok!(first.await.expect("join"));
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 1,
                last_block: 1
            }
        );
        assert!(!service.is_syncing());
    }

    /// Delegates to the memory store, optionally failing state loads.
    struct FlakyStore {
        inner: InMemoryHistoryStore,
        fail_loads: AtomicBool,
    }

    #[async_trait]
    impl HistoryStore for FlakyStore {
        async fn load_state(&self) -> Result<IndexerState, StoreError> {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(StoreError::InvalidData("connection reset".to_string()));
            }
            self.inner.load_state().await
        }

        async fn update_state(&self, update: &StateUpdate) -> Result<(), StoreError> {
            self.inner.update_state(update).await
        }

        async fn record_event(&self, event: &SettlementEvent) -> Result<(), StoreError> {
            self.inner.record_event(event).await
        }

        async fn mark_event_processed(
            &self,
            transaction_hash: &str,
            processed_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner
                .mark_event_processed(transaction_hash, processed_at)
                .await
        }

        async fn mark_event_failed(
            &self,
            transaction_hash: &str,
            error: &str,
        ) -> Result<(), StoreError> {
            self.inner.mark_event_failed(transaction_hash, error).await
        }

        async fn event_processed(
            &self,
            transaction_hash: &str,
        ) -> Result<Option<bool>, StoreError> {
            self.inner.event_processed(transaction_hash).await
        }

        async fn upsert_market(&self, record: &MarketHistoryRecord) -> Result<(), StoreError> {
            self.inner.upsert_market(record).await
        }

        async fn upsert_outcomes(
            &self,
            records: &[OutcomeHistoryRecord],
        ) -> Result<(), StoreError> {
            self.inner.upsert_outcomes(records).await
        }

        async fn upsert_bet(&self, record: &BetHistoryRecord) -> Result<(), StoreError> {
            self.inner.upsert_bet(record).await
        }

        async fn upsert_contest(&self, record: &ContestHistoryRecord) -> Result<(), StoreError> {
            self.inner.upsert_contest(record).await
        }

        async fn upsert_entry(&self, record: &EntryHistoryRecord) -> Result<(), StoreError> {
            self.inner.upsert_entry(record).await
        }

        async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError> {
            self.inner.upsert_profile(record).await
        }

        async fn has_market(&self, market_id: &str) -> Result<bool, StoreError> {
            self.inner.has_market(market_id).await
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_state_load_failure_uses_last_good_state() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryHistoryStore::with_state(IndexerState {
                last_synced_block: 20,
                ..Default::default()
            }),
            fail_loads: AtomicBool::new(false),
        });
        let source = ScriptedSource::with_events(vec![withdrawal("tx15", 15)]);
        let service = service_with(source, store.clone(), 5);

        // Block 15 is below the cursor and is skipped.
        assert_ok!(service.sync_once().await);

        store.fail_loads.store(true, Ordering::SeqCst);
        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 0,
                last_block: 20
            }
        );
        assert_eq!(service.metrics().events_processed(), 0);
    }

    #[tokio::test]
    async fn test_state_load_failure_without_cache_starts_from_zero() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryHistoryStore::with_state(IndexerState {
                last_synced_block: 20,
                ..Default::default()
            }),
            fail_loads: AtomicBool::new(true),
        });
        let source = ScriptedSource::with_events(vec![withdrawal("tx15", 15)]);
        let service = service_with(source, store.clone(), 5);

        let outcome = assert_ok!(service.sync_once().await);
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                events: 1,
                last_block: 15
            }
        );
    }

    #[tokio::test]
    async fn test_run_syncs_immediately_and_stop_pauses() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = Arc::new(ScriptedSource::with_events(vec![withdrawal("tx1", 1)]));
        let config = IndexerConfig {
            poll_interval_ms: 60_000,
            ..Default::default()
        };
        let service = Arc::new(IndexerService::new(
            &config,
            store.clone(),
            Arc::clone(&source) as Arc<dyn SettlementSource>,
        ));

        let handle = tokio::spawn(Arc::clone(&service).run());
        while store.state().await.map(|s| s.last_synced_block) != Some(1) {
            tokio::task::yield_now().await;
        }

        assert_ok!(service.stop().await);
        assert_ok!(handle.await);

        assert_eq!(source.feed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.state().await.map(|s| s.status),
            Some(IndexerStatus::Paused)
        );
    }

    #[tokio::test]
    async fn test_stop_aborts_in_flight_cycle_before_pausing() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(InMemoryHistoryStore::new());
        let source = ScriptedSource {
            gate: Some(Arc::clone(&gate)),
            ..ScriptedSource::with_events(vec![withdrawal("tx1", 1)])
        };
        let service = Arc::new(service_with(source, store.clone(), 5));

        let handle = tokio::spawn(Arc::clone(&service).run());
        while !service.is_syncing() {
            tokio::task::yield_now().await;
        }

        assert_ok!(service.stop().await);
        assert!(!service.is_syncing());

        // Releasing the feed must not revive the aborted cycle.
        gate.notify_one();
        assert_ok!(handle.await);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let state = store.state().await.expect("state");
        assert_eq!(state.status, IndexerStatus::Paused);
        assert_eq!(state.last_synced_block, 0);
        assert_eq!(store.audit_len().await, 0);
    }

    #[tokio::test]
    async fn test_stop_without_run_pauses() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let service = service_with(ScriptedSource::default(), store.clone(), 5);

        assert_ok!(service.stop().await);
        assert_eq!(
            store.state().await.map(|s| s.status),
            Some(IndexerStatus::Paused)
        );
    }

    #[test]
    fn test_running_guard_clears_flag() {
        let flag = AtomicBool::new(false);
        {
            let guard = RunningGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(RunningGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
