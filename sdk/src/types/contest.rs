//! Contest types for the PRISM SDK.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SdkError;

/// One entry of a settled contest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContestEntry {
    /// Entry identifier.
    #[serde(alias = "entry_id")]
    pub id: String,

    /// Wallet that owns the entry.
    #[serde(alias = "wallet_address")]
    pub user_address: String,

    /// Final rank, 1-based.
    #[serde(default, alias = "final_rank", skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    /// Payout awarded to the entry.
    #[serde(default)]
    pub payout: Decimal,

    /// Final score, if the contest is scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Decimal>,
}

/// Payload of a `ContestSettled` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettledContest {
    /// Contest identifier.
    #[serde(alias = "id")]
    pub contest_id: String,

    /// Contest title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Winning wallet addresses.
    #[serde(default)]
    pub winners: Vec<String>,

    /// Payout structure as published by the oracle.
    #[serde(default)]
    pub payout_structure: Value,

    /// Total prize pool.
    #[serde(default)]
    pub prize_pool: Decimal,

    /// Oracle proof of the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_proof: Option<String>,

    /// Oracle signature over the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_signature: Option<String>,

    /// Settlement time (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<String>,

    /// All entries of the contest.
    #[serde(default)]
    pub entries: Vec<ContestEntry>,
}

impl SettledContest {
    /// Checks that the contest and its entries are identifiable.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::MissingField` naming the first empty field.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.contest_id.trim().is_empty() {
            return Err(SdkError::MissingField("contest_id"));
        }
        for entry in &self.entries {
            if entry.id.trim().is_empty() {
                return Err(SdkError::MissingField("entries[].id"));
            }
            if entry.user_address.trim().is_empty() {
                return Err(SdkError::MissingField("entries[].user_address"));
            }
        }
        Ok(())
    }

    /// Returns true if `user_address` is among the winners.
    #[must_use]
    pub fn is_winner(&self, user_address: &str) -> bool {
        self.winners.iter().any(|w| w == user_address)
    }
}
