//! PRISM SDK - Rust client library for the PRISM L2 service.
//!
//! This crate provides the settlement event types published by the L2
//! service and a typed HTTP client for the endpoints the settlement
//! indexer consumes.
//!
//! # Core Types
//!
//! - [`SettlementEvent`] - A finalized state transition with its cursor and
//!   idempotency key
//! - [`EventType`] / [`EventPayload`] - Event kind and its typed payload
//! - [`ResolvedMarket`], [`Bet`], [`SettledContest`] - L2 snapshots
//!
//! # Example
//!
//! ```rust
//! use prism_sdk::{EventPayload, EventType, SettlementEvent};
//!
//! let event = SettlementEvent::new(
//!     EventType::MarketResolved,
//!     42,
//!     "tx1",
//!     "2025-01-01T00:00:00Z",
//!     serde_json::json!({"id": "m1", "winning_outcome": "Yes"}),
//! );
//! assert!(matches!(event.payload(), Ok(EventPayload::MarketResolved(_))));
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, ClientError, L2Client};
pub use error::SdkError;
pub use types::{
    parse_timestamp, Bet, BetSettlement, ContestEntry, EventPayload, EventType, OutcomeSnapshot,
    ResolvedMarket, SettledContest, SettlementEvent, WithdrawalNotice,
};
