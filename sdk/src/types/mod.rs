//! Core types for the PRISM SDK.
//!
//! Wire types exchanged with the L2 service: settlement events and the
//! market, bet and contest snapshots they refer to.

pub mod bet;
pub mod contest;
pub mod event;
pub mod market;

pub use bet::{Bet, BetSettlement};
pub use contest::{ContestEntry, SettledContest};
pub use event::{parse_timestamp, EventPayload, EventType, SettlementEvent, WithdrawalNotice};
pub use market::{OutcomeSnapshot, ResolvedMarket};
