//! Metrics tracking for the indexer.
//!
//! Lock-free counters updated by the sync loop and the event processor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::types::ProcessOutcome;

/// Metrics for the settlement indexer.
#[derive(Debug)]
pub struct IndexerMetrics {
    /// Sync cycles that ran.
    sync_cycles: AtomicU64,

    /// Ticks dropped because a cycle was still running.
    skipped_ticks: AtomicU64,

    /// Events processed successfully.
    events_processed: AtomicU64,

    /// Events that were not settlements.
    events_ignored: AtomicU64,

    /// Events already covered by the cursor.
    events_skipped: AtomicU64,

    /// Markets written to history.
    markets_settled: AtomicU64,

    /// Contests written to history.
    contests_settled: AtomicU64,

    /// Bets written to history.
    bets_settled: AtomicU64,

    /// Contest entries written to history.
    entries_settled: AtomicU64,

    /// Batches served by the resolved-markets fallback.
    fallback_fetches: AtomicU64,

    /// Failed sync cycles.
    sync_failures: AtomicU64,

    /// Events given up on after repeated failures.
    dead_letters: AtomicU64,

    /// Total sync time in nanoseconds.
    total_sync_time_ns: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for IndexerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sync_cycles: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            events_skipped: AtomicU64::new(0),
            markets_settled: AtomicU64::new(0),
            contests_settled: AtomicU64::new(0),
            bets_settled: AtomicU64::new(0),
            entries_settled: AtomicU64::new(0),
            fallback_fetches: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
            dead_letters: AtomicU64::new(0),
            total_sync_time_ns: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a completed sync cycle and its duration.
    pub fn record_cycle(&self, duration: Duration) {
        self.sync_cycles.fetch_add(1, Ordering::Relaxed);
        self.total_sync_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Records a tick dropped by the running guard.
    pub fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records what processing one event produced.
    pub fn record_outcome(&self, outcome: &ProcessOutcome) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ProcessOutcome::MarketResolved { .. } => {
                self.markets_settled.fetch_add(1, Ordering::Relaxed);
                self.bets_settled
                    .fetch_add(outcome.bets_settled() as u64, Ordering::Relaxed);
            }
            ProcessOutcome::ContestSettled { entries, .. } => {
                self.contests_settled.fetch_add(1, Ordering::Relaxed);
                self.entries_settled
                    .fetch_add(*entries as u64, Ordering::Relaxed);
            }
            ProcessOutcome::Ignored(_) => {
                self.events_ignored.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Audited(_) => {}
        }
    }

    /// Records an event already covered by the cursor.
    pub fn record_event_skipped(&self) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a batch served by the fallback.
    pub fn record_fallback(&self) {
        self.fallback_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed sync cycle.
    pub fn record_failure(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dead-lettered event.
    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of sync cycles.
    #[must_use]
    pub fn sync_cycles(&self) -> u64 {
        self.sync_cycles.load(Ordering::Relaxed)
    }

    /// Returns the number of skipped ticks.
    #[must_use]
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Returns the number of events processed.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Returns the number of ignored events.
    #[must_use]
    pub fn events_ignored(&self) -> u64 {
        self.events_ignored.load(Ordering::Relaxed)
    }

    /// Returns the number of events skipped by the cursor.
    #[must_use]
    pub fn events_skipped(&self) -> u64 {
        self.events_skipped.load(Ordering::Relaxed)
    }

    /// Returns the number of markets settled.
    #[must_use]
    pub fn markets_settled(&self) -> u64 {
        self.markets_settled.load(Ordering::Relaxed)
    }

    /// Returns the number of contests settled.
    #[must_use]
    pub fn contests_settled(&self) -> u64 {
        self.contests_settled.load(Ordering::Relaxed)
    }

    /// Returns the number of bets settled.
    #[must_use]
    pub fn bets_settled(&self) -> u64 {
        self.bets_settled.load(Ordering::Relaxed)
    }

    /// Returns the number of contest entries settled.
    #[must_use]
    pub fn entries_settled(&self) -> u64 {
        self.entries_settled.load(Ordering::Relaxed)
    }

    /// Returns the number of fallback batches.
    #[must_use]
    pub fn fallback_fetches(&self) -> u64 {
        self.fallback_fetches.load(Ordering::Relaxed)
    }

    /// Returns the number of failed cycles.
    #[must_use]
    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of dead-lettered events.
    #[must_use]
    pub fn dead_letters(&self) -> u64 {
        self.dead_letters.load(Ordering::Relaxed)
    }

    /// Returns the average duration of a sync cycle.
    #[must_use]
    pub fn average_sync_time(&self) -> Duration {
        let cycles = self.sync_cycles();
        if cycles == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_sync_time_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / cycles)
    }

    /// Returns the events per second since start.
    #[must_use]
    pub fn events_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.events_processed() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sync_cycles: self.sync_cycles(),
            skipped_ticks: self.skipped_ticks(),
            events_processed: self.events_processed(),
            events_ignored: self.events_ignored(),
            events_skipped: self.events_skipped(),
            markets_settled: self.markets_settled(),
            contests_settled: self.contests_settled(),
            bets_settled: self.bets_settled(),
            entries_settled: self.entries_settled(),
            fallback_fetches: self.fallback_fetches(),
            sync_failures: self.sync_failures(),
            dead_letters: self.dead_letters(),
            average_sync_time: self.average_sync_time(),
            events_per_second: self.events_per_second(),
        }
    }
}

/// A point-in-time snapshot of indexer metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Sync cycles.
    pub sync_cycles: u64,
    /// Skipped ticks.
    pub skipped_ticks: u64,
    /// Events processed.
    pub events_processed: u64,
    /// Events ignored.
    pub events_ignored: u64,
    /// Events skipped by the cursor.
    pub events_skipped: u64,
    /// Markets settled.
    pub markets_settled: u64,
    /// Contests settled.
    pub contests_settled: u64,
    /// Bets settled.
    pub bets_settled: u64,
    /// Contest entries settled.
    pub entries_settled: u64,
    /// Fallback batches.
    pub fallback_fetches: u64,
    /// Failed cycles.
    pub sync_failures: u64,
    /// Dead-lettered events.
    pub dead_letters: u64,
    /// Average sync time.
    pub average_sync_time: Duration,
    /// Events per second.
    pub events_per_second: f64,
}

#[cfg(test)]
mod tests {
    use prism_sdk::EventType;

    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = IndexerMetrics::new();
        assert_eq!(metrics.sync_cycles(), 0);
        assert_eq!(metrics.events_processed(), 0);
        assert_eq!(metrics.dead_letters(), 0);
        assert_eq!(metrics.average_sync_time(), Duration::ZERO);
    }

    #[test]
    fn test_metrics_record_market_outcome() {
        let metrics = IndexerMetrics::new();
        metrics.record_outcome(&ProcessOutcome::MarketResolved {
            market_id: "m1".to_string(),
            outcomes: 2,
            bets_won: 1,
            bets_lost: 2,
        });

        assert_eq!(metrics.events_processed(), 1);
        assert_eq!(metrics.markets_settled(), 1);
        assert_eq!(metrics.bets_settled(), 3);
    }

    #[test]
    fn test_metrics_record_contest_outcome() {
        let metrics = IndexerMetrics::new();
        metrics.record_outcome(&ProcessOutcome::ContestSettled {
            contest_id: "c1".to_string(),
            entries: 4,
            winners: 1,
        });

        assert_eq!(metrics.contests_settled(), 1);
        assert_eq!(metrics.entries_settled(), 4);
    }

    #[test]
    fn test_metrics_record_ignored_and_audited() {
        let metrics = IndexerMetrics::new();
        metrics.record_outcome(&ProcessOutcome::Ignored(EventType::from("BetPlaced")));
        metrics.record_outcome(&ProcessOutcome::Audited(EventType::Withdrawal));

        assert_eq!(metrics.events_processed(), 2);
        assert_eq!(metrics.events_ignored(), 1);
        assert_eq!(metrics.markets_settled(), 0);
    }

    #[test]
    fn test_metrics_average_sync_time() {
        let metrics = IndexerMetrics::new();
        metrics.record_cycle(Duration::from_millis(10));
        metrics.record_cycle(Duration::from_millis(30));

        assert_eq!(metrics.sync_cycles(), 2);
        assert_eq!(metrics.average_sync_time(), Duration::from_millis(20));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IndexerMetrics::new();
        metrics.record_skipped_tick();
        metrics.record_event_skipped();
        metrics.record_fallback();
        metrics.record_failure();
        metrics.record_dead_letter();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.skipped_ticks, 1);
        assert_eq!(snapshot.events_skipped, 1);
        assert_eq!(snapshot.fallback_fetches, 1);
        assert_eq!(snapshot.sync_failures, 1);
        assert_eq!(snapshot.dead_letters, 1);
    }
}
