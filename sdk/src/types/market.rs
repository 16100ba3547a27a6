//! Market types for the PRISM SDK.
//!
//! Provides resolved market snapshots as reported by the L2 service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Final state of one outcome of a resolved market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSnapshot {
    /// Outcome identifier (e.g. "Yes").
    pub id: String,

    /// Display label.
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Final odds (price) of the outcome.
    #[serde(default, alias = "price", skip_serializing_if = "Option::is_none")]
    pub odds: Option<Decimal>,

    /// Final liquidity in the outcome pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<Decimal>,

    /// Total volume traded on the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

/// Snapshot of a resolved market.
///
/// This is both the payload of a `MarketResolved` event and the item type
/// of `GET /markets?status=resolved`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMarket {
    /// Market identifier.
    pub id: String,

    /// Market question.
    #[serde(default, alias = "question", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Category slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Identifier of the winning outcome.
    #[serde(alias = "resolved_outcome", alias = "winning_option")]
    pub winning_outcome: String,

    /// Final outcome snapshots.
    #[serde(default)]
    pub outcomes: Vec<OutcomeSnapshot>,

    /// Total volume traded on the market.
    #[serde(default)]
    pub total_volume: Decimal,

    /// Total liquidity at resolution.
    #[serde(default)]
    pub total_liquidity: Decimal,

    /// Number of bets placed on the market.
    #[serde(default)]
    pub total_bets: u64,

    /// Creation time (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Resolution time (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

impl ResolvedMarket {
    /// Creates a minimal resolved market.
    #[must_use]
    pub fn new(id: impl Into<String>, winning_outcome: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            winning_outcome: winning_outcome.into(),
            ..Default::default()
        }
    }

    /// Checks that the identifying fields are non-empty.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::MissingField` naming the first empty field.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.id.trim().is_empty() {
            return Err(SdkError::MissingField("id"));
        }
        if self.winning_outcome.trim().is_empty() {
            return Err(SdkError::MissingField("winning_outcome"));
        }
        if self.outcomes.iter().any(|o| o.id.trim().is_empty()) {
            return Err(SdkError::MissingField("outcomes[].id"));
        }
        Ok(())
    }

    /// Returns true if `outcome_id` is the winning outcome.
    #[must_use]
    pub fn is_winning(&self, outcome_id: &str) -> bool {
        self.winning_outcome == outcome_id
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_market_deserialize_aliases() {
        let market: ResolvedMarket = serde_json::from_value(json!({
            "id": "m1",
            "question": "Will it rain?",
            "resolved_outcome": "No",
            "total_volume": 125.5,
            "outcomes": [{"id": "Yes", "name": "Yes", "price": 0.25}]
        }))
        .expect("market");

        assert_eq!(market.title.as_deref(), Some("Will it rain?"));
        assert_eq!(market.winning_outcome, "No");
        assert_eq!(market.total_volume, Decimal::new(1255, 1));
        assert_eq!(market.outcomes[0].odds, Some(Decimal::new(25, 2)));
        assert_eq!(market.total_bets, 0);
    }

    #[test]
    fn test_market_validate() {
        assert!(ResolvedMarket::new("m1", "Yes").validate().is_ok());
        assert_eq!(
            ResolvedMarket::new(" ", "Yes").validate(),
            Err(SdkError::MissingField("id"))
        );

        let mut market = ResolvedMarket::new("m1", "Yes");
        market.outcomes.push(OutcomeSnapshot::default());
        assert_eq!(
            market.validate(),
            Err(SdkError::MissingField("outcomes[].id"))
        );
    }

    #[test]
    fn test_market_is_winning() {
        let market = ResolvedMarket::new("m1", "Yes");
        assert!(market.is_winning("Yes"));
        assert!(!market.is_winning("No"));
        assert!(!market.is_winning("yes"));
    }
}
