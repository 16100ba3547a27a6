//! Types for the event processor.
//!
//! Defines the historical projections written for settled markets and
//! contests, and the per-event processing outcome.

use chrono::{DateTime, Utc};
use prism_sdk::{
    parse_timestamp, Bet, ContestEntry, EventType, OutcomeSnapshot, ResolvedMarket,
    SettledContest, SettlementEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status stored for every market in history.
pub const MARKET_STATUS_RESOLVED: &str = "resolved";

/// Status stored for every contest in history.
pub const CONTEST_STATUS_SETTLED: &str = "settled";

/// Final status of a bet in history.
///
/// Only settled bets are ever written, so there is no active variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    /// The bet backed the winning outcome.
    Won,
    /// The bet backed a losing outcome.
    Lost,
}

impl BetStatus {
    /// Maps a win flag to a status.
    #[must_use]
    pub const fn from_win(won: bool) -> Self {
        if won {
            Self::Won
        } else {
            Self::Lost
        }
    }

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }
}

/// Result of a contest entry in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryResult {
    /// The entry's owner is among the winners.
    Win,
    /// The entry's owner is not among the winners.
    Loss,
}

impl EntryResult {
    /// Maps a win flag to a result.
    #[must_use]
    pub const fn from_win(won: bool) -> Self {
        if won {
            Self::Win
        } else {
            Self::Loss
        }
    }

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
        }
    }
}

/// Final snapshot of a resolved market. Keyed by `market_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHistoryRecord {
    /// Market identifier.
    pub market_id: String,
    /// Market question.
    pub title: Option<String>,
    /// Long description.
    pub description: Option<String>,
    /// Category slug.
    pub category: Option<String>,
    /// Always [`MARKET_STATUS_RESOLVED`].
    pub status: String,
    /// Winning outcome identifier.
    pub resolved_outcome: String,
    /// Total volume traded.
    pub total_volume: Decimal,
    /// Liquidity at resolution.
    pub total_liquidity: Decimal,
    /// Number of bets placed.
    pub total_bets: u64,
    /// Market creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Transaction that resolved the market.
    pub resolution_tx_hash: String,
    /// Block of the resolution.
    pub resolution_block: u64,
}

impl MarketHistoryRecord {
    /// Builds the record for a market resolved by `event`.
    ///
    /// Falls back to the event timestamp when the market carries no
    /// resolution time.
    #[must_use]
    pub fn from_resolved(market: &ResolvedMarket, event: &SettlementEvent) -> Self {
        Self {
            market_id: market.id.clone(),
            title: market.title.clone(),
            description: market.description.clone(),
            category: market.category.clone(),
            status: MARKET_STATUS_RESOLVED.to_string(),
            resolved_outcome: market.winning_outcome.clone(),
            total_volume: market.total_volume,
            total_liquidity: market.total_liquidity,
            total_bets: market.total_bets,
            created_at: market.created_at.as_deref().and_then(parse_timestamp),
            resolved_at: market
                .resolved_at
                .as_deref()
                .and_then(parse_timestamp)
                .or_else(|| event.timestamp_utc()),
            resolution_tx_hash: event.transaction_hash.clone(),
            resolution_block: event.block_number,
        }
    }
}

/// Final state of one outcome. Keyed by `(market_id, outcome_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeHistoryRecord {
    /// Market identifier.
    pub market_id: String,
    /// Outcome identifier.
    pub outcome_id: String,
    /// Display label.
    pub label: Option<String>,
    /// Final odds.
    pub final_odds: Option<Decimal>,
    /// Final liquidity.
    pub final_liquidity: Option<Decimal>,
    /// Total volume on the outcome.
    pub total_volume: Option<Decimal>,
    /// Whether this outcome won.
    pub is_winner: bool,
}

impl OutcomeHistoryRecord {
    /// Builds the record for one outcome of a resolved market.
    #[must_use]
    pub fn from_snapshot(market: &ResolvedMarket, outcome: &OutcomeSnapshot) -> Self {
        Self {
            market_id: market.id.clone(),
            outcome_id: outcome.id.clone(),
            label: outcome.label.clone(),
            final_odds: outcome.odds,
            final_liquidity: outcome.liquidity,
            total_volume: outcome.volume,
            is_winner: market.is_winning(&outcome.id),
        }
    }
}

/// A settled bet. Keyed by `bet_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetHistoryRecord {
    /// Bet identifier.
    pub bet_id: String,
    /// Market identifier.
    pub market_id: String,
    /// Bettor wallet.
    pub user_address: String,
    /// Outcome backed.
    pub outcome_id: String,
    /// Stake.
    pub amount: Decimal,
    /// Odds at placement.
    pub odds: Option<Decimal>,
    /// Payout had the bet won.
    pub potential_payout: Decimal,
    /// Amount actually paid out.
    pub payout_amount: Decimal,
    /// Won or lost.
    pub status: BetStatus,
    /// Placement time.
    pub placed_at: Option<DateTime<Utc>>,
    /// Settlement time.
    pub settled_at: Option<DateTime<Utc>>,
}

impl BetHistoryRecord {
    /// Settles `bet` against the market's winning outcome.
    #[must_use]
    pub fn settle(bet: &Bet, market: &ResolvedMarket, settled_at: Option<DateTime<Utc>>) -> Self {
        let won = bet.wins(&market.winning_outcome);
        Self {
            bet_id: bet.id.clone(),
            market_id: market.id.clone(),
            user_address: bet.user_address.clone(),
            outcome_id: bet.outcome_id.clone(),
            amount: bet.amount,
            odds: bet.odds,
            potential_payout: bet.potential_payout,
            payout_amount: bet.payout_for(&market.winning_outcome),
            status: BetStatus::from_win(won),
            placed_at: bet.created_at.as_deref().and_then(parse_timestamp),
            settled_at,
        }
    }
}

/// Final state of a settled contest. Keyed by `contest_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestHistoryRecord {
    /// Contest identifier.
    pub contest_id: String,
    /// Contest title.
    pub title: Option<String>,
    /// Always [`CONTEST_STATUS_SETTLED`].
    pub status: String,
    /// Winning wallets.
    pub winners: Vec<String>,
    /// Payout structure as published.
    pub payout_structure: Value,
    /// Prize pool.
    pub prize_pool: Decimal,
    /// Oracle proof.
    pub oracle_proof: Option<String>,
    /// Oracle signature.
    pub oracle_signature: Option<String>,
    /// Settlement time.
    pub settled_at: Option<DateTime<Utc>>,
    /// Transaction that settled the contest.
    pub settlement_tx_hash: String,
    /// Block of the settlement.
    pub settlement_block: u64,
}

impl ContestHistoryRecord {
    /// Builds the record for a contest settled by `event`.
    #[must_use]
    pub fn from_settled(contest: &SettledContest, event: &SettlementEvent) -> Self {
        Self {
            contest_id: contest.contest_id.clone(),
            title: contest.title.clone(),
            status: CONTEST_STATUS_SETTLED.to_string(),
            winners: contest.winners.clone(),
            payout_structure: contest.payout_structure.clone(),
            prize_pool: contest.prize_pool,
            oracle_proof: contest.oracle_proof.clone(),
            oracle_signature: contest.oracle_signature.clone(),
            settled_at: contest
                .settled_at
                .as_deref()
                .and_then(parse_timestamp)
                .or_else(|| event.timestamp_utc()),
            settlement_tx_hash: event.transaction_hash.clone(),
            settlement_block: event.block_number,
        }
    }
}

/// Final result of a contest entry. Keyed by `entry_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHistoryRecord {
    /// Entry identifier.
    pub entry_id: String,
    /// Contest identifier.
    pub contest_id: String,
    /// Entry owner.
    pub user_address: String,
    /// Win or loss.
    pub result: EntryResult,
    /// Final rank.
    pub final_rank: Option<u32>,
    /// Payout awarded.
    pub payout_amount: Decimal,
    /// Final score.
    pub score: Option<Decimal>,
}

impl EntryHistoryRecord {
    /// Builds the record for one entry of a settled contest.
    #[must_use]
    pub fn from_entry(contest: &SettledContest, entry: &ContestEntry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            contest_id: contest.contest_id.clone(),
            user_address: entry.user_address.clone(),
            result: EntryResult::from_win(contest.is_winner(&entry.user_address)),
            final_rank: entry.rank,
            payout_amount: entry.payout,
            score: entry.score,
        }
    }
}

/// Minimal profile row: wallet address only, no live statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Wallet address.
    pub wallet_address: String,
}

impl ProfileRecord {
    /// Creates a profile for a wallet.
    #[must_use]
    pub fn new(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
        }
    }
}

/// What processing one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A market and its bets were written to history.
    MarketResolved {
        /// Market identifier.
        market_id: String,
        /// Outcome rows written.
        outcomes: usize,
        /// Bets settled as won.
        bets_won: usize,
        /// Bets settled as lost.
        bets_lost: usize,
    },

    /// A contest and its entries were written to history.
    ContestSettled {
        /// Contest identifier.
        contest_id: String,
        /// Entry rows written.
        entries: usize,
        /// Entries that won.
        winners: usize,
    },

    /// Recorded in the audit log only.
    Audited(EventType),

    /// Not a settlement; nothing projected.
    Ignored(EventType),
}

impl ProcessOutcome {
    /// Returns true if history tables were written.
    #[must_use]
    pub const fn materialized(&self) -> bool {
        matches!(
            self,
            Self::MarketResolved { .. } | Self::ContestSettled { .. }
        )
    }

    /// Returns the number of bets settled.
    #[must_use]
    pub const fn bets_settled(&self) -> usize {
        match self {
            Self::MarketResolved {
                bets_won,
                bets_lost,
                ..
            } => *bets_won + *bets_lost,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event() -> SettlementEvent {
        SettlementEvent::new(
            EventType::MarketResolved,
            42,
            "tx1",
            "2025-01-01T00:00:00Z",
            Value::Null,
        )
    }

    fn bet(id: &str, outcome: &str) -> Bet {
        serde_json::from_value(json!({
            "id": id,
            "user_address": "u1",
            "outcome_id": outcome,
            "amount": 10,
            "potential_payout": 20
        }))
        .expect("bet")
    }

    #[test]
    fn test_market_record_falls_back_to_event_time() {
        let market = ResolvedMarket::new("m1", "Yes");
        let record = MarketHistoryRecord::from_resolved(&market, &event());

        assert_eq!(record.status, MARKET_STATUS_RESOLVED);
        assert_eq!(record.resolved_outcome, "Yes");
        assert_eq!(record.resolution_block, 42);
        assert_eq!(record.resolution_tx_hash, "tx1");
        assert_eq!(record.resolved_at, event().timestamp_utc());
    }

    #[test]
    fn test_outcome_record_marks_winner() {
        let market = ResolvedMarket::new("m1", "Yes");
        let yes = OutcomeSnapshot {
            id: "Yes".to_string(),
            ..Default::default()
        };
        let no = OutcomeSnapshot {
            id: "No".to_string(),
            ..Default::default()
        };

        assert!(OutcomeHistoryRecord::from_snapshot(&market, &yes).is_winner);
        assert!(!OutcomeHistoryRecord::from_snapshot(&market, &no).is_winner);
    }

    #[test]
    fn test_bet_record_settlement() {
        let market = ResolvedMarket::new("m1", "Yes");

        let won = BetHistoryRecord::settle(&bet("b1", "Yes"), &market, None);
        assert_eq!(won.status, BetStatus::Won);
        assert_eq!(won.payout_amount, Decimal::from(20));

        let lost = BetHistoryRecord::settle(&bet("b2", "No"), &market, None);
        assert_eq!(lost.status, BetStatus::Lost);
        assert_eq!(lost.payout_amount, Decimal::ZERO);
        assert_eq!(lost.potential_payout, Decimal::from(20));
    }

    #[test]
    fn test_entry_record_result() {
        let contest = SettledContest {
            contest_id: "c1".to_string(),
            winners: vec!["u1".to_string()],
            ..Default::default()
        };
        let winner = ContestEntry {
            id: "e1".to_string(),
            user_address: "u1".to_string(),
            rank: Some(1),
            ..Default::default()
        };
        let loser = ContestEntry {
            id: "e2".to_string(),
            user_address: "u2".to_string(),
            ..Default::default()
        };

        assert_eq!(
            EntryHistoryRecord::from_entry(&contest, &winner).result,
            EntryResult::Win
        );
        assert_eq!(
            EntryHistoryRecord::from_entry(&contest, &loser).result,
            EntryResult::Loss
        );
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(BetStatus::Won).expect("json"), "won");
        assert_eq!(serde_json::to_value(EntryResult::Loss).expect("json"), "loss");
        assert_eq!(BetStatus::from_win(false).as_str(), "lost");
        assert_eq!(EntryResult::from_win(true).as_str(), "win");
    }

    #[test]
    fn test_process_outcome_helpers() {
        let outcome = ProcessOutcome::MarketResolved {
            market_id: "m1".to_string(),
            outcomes: 2,
            bets_won: 1,
            bets_lost: 3,
        };
        assert!(outcome.materialized());
        assert_eq!(outcome.bets_settled(), 4);

        let ignored = ProcessOutcome::Ignored(EventType::from("BetPlaced"));
        assert!(!ignored.materialized());
        assert_eq!(ignored.bets_settled(), 0);
    }
}
