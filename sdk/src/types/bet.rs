//! Bet types for the PRISM SDK.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// A bet as returned by `GET /bets?market_id=ID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Bet identifier.
    pub id: String,

    /// Market the bet belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,

    /// Wallet that placed the bet.
    #[serde(alias = "wallet_address", alias = "user")]
    pub user_address: String,

    /// Outcome the bet backs.
    #[serde(alias = "outcome")]
    pub outcome_id: String,

    /// Stake.
    pub amount: Decimal,

    /// Payout if the bet wins.
    #[serde(default)]
    pub potential_payout: Decimal,

    /// Odds at placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds: Option<Decimal>,

    /// Placement time (ISO-8601).
    #[serde(default, alias = "placed_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Bet {
    /// Checks that the bet identifies itself, its owner, and its outcome.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::MissingField` naming the first empty field.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.id.trim().is_empty() {
            return Err(SdkError::MissingField("id"));
        }
        if self.user_address.trim().is_empty() {
            return Err(SdkError::MissingField("user_address"));
        }
        if self.outcome_id.trim().is_empty() {
            return Err(SdkError::MissingField("outcome_id"));
        }
        Ok(())
    }

    /// Returns true if the bet backs `winning_outcome`.
    #[must_use]
    pub fn wins(&self, winning_outcome: &str) -> bool {
        self.outcome_id == winning_outcome
    }

    /// Returns the amount paid out given the winning outcome.
    #[must_use]
    pub fn payout_for(&self, winning_outcome: &str) -> Decimal {
        if self.wins(winning_outcome) {
            self.potential_payout
        } else {
            Decimal::ZERO
        }
    }
}

/// Audit payload of a `BetSettled` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetSettlement {
    /// Settled bet.
    #[serde(default, alias = "id")]
    pub bet_id: Option<String>,

    /// Market of the bet.
    #[serde(default)]
    pub market_id: Option<String>,

    /// Bettor wallet.
    #[serde(default)]
    pub user_address: Option<String>,

    /// Payout credited.
    #[serde(default)]
    pub payout: Option<Decimal>,

    /// Whether the bet won.
    #[serde(default)]
    pub won: Option<bool>,
}
