//! Event processing for the settlement indexer.
//!
//! This module turns settlement events from the L2 into historical rows.
//!
//! # Components
//!
//! - [`types`]: history records and the per-event outcome
//! - [`cursor`]: BlockCursor and the persisted indexer state
//! - [`processor`]: EventProcessor implementation
//! - [`metrics`]: indexer metrics

pub mod cursor;
pub mod metrics;
pub mod processor;
pub mod types;

pub use cursor::{BlockCursor, IndexerState, IndexerStatus, StateUpdate};
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use processor::EventProcessor;
pub use types::{
    BetHistoryRecord, BetStatus, ContestHistoryRecord, EntryHistoryRecord, EntryResult,
    MarketHistoryRecord, OutcomeHistoryRecord, ProcessOutcome, ProfileRecord,
    CONTEST_STATUS_SETTLED, MARKET_STATUS_RESOLVED,
};
