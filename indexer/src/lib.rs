//! PRISM Indexer - Settlement history for the PRISM L2.
//!
//! This crate polls the L2 for settlement events and projects resolved
//! markets, settled bets and settled contests into an append-mostly
//! historical store. Live state stays on the L2; only final outcomes are
//! written here.
//!
//! # Components
//!
//! - [`config`]: Environment-driven configuration
//! - [`source`]: Read side of the L2
//! - [`feed`]: Settlement feed with the resolved-markets fallback
//! - [`events`]: History records, cursor and event processor
//! - [`store`]: Historical store backends
//! - [`service`]: Sync loop

pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod service;
pub mod source;
pub mod store;

pub use config::{ConfigError, IndexerConfig, StoreBackend, StoreSettings};
pub use error::IndexerError;
pub use events::{EventProcessor, IndexerMetrics, IndexerState, IndexerStatus, ProcessOutcome};
pub use feed::{EventFeed, FeedOrigin, FetchError, FetchedBatch};
pub use service::{IndexerService, SyncOutcome};
pub use source::SettlementSource;
pub use store::{
    HistoryStore, InMemoryHistoryStore, PgHistoryStore, StoreError, SupabaseHistoryStore,
};
