//! Settlement source abstraction.
//!
//! The indexer reads the L2 through [`SettlementSource`] so tests can
//! substitute scripted sources for the HTTP client.

use async_trait::async_trait;
use prism_sdk::{Bet, ClientError, L2Client, ResolvedMarket, SettlementEvent};

/// Read side of the L2 consumed by the indexer.
#[async_trait]
pub trait SettlementSource: Send + Sync {
    /// Returns settlement events at or after `from_block`.
    async fn fetch_settlement_events(
        &self,
        from_block: u64,
    ) -> Result<Vec<SettlementEvent>, ClientError>;

    /// Returns every resolved market.
    async fn fetch_resolved_markets(&self) -> Result<Vec<ResolvedMarket>, ClientError>;

    /// Returns every bet placed on a market.
    async fn fetch_bets(&self, market_id: &str) -> Result<Vec<Bet>, ClientError>;
}

#[async_trait]
impl SettlementSource for L2Client {
    async fn fetch_settlement_events(
        &self,
        from_block: u64,
    ) -> Result<Vec<SettlementEvent>, ClientError> {
        self.get_settlement_events(from_block).await
    }

    async fn fetch_resolved_markets(&self) -> Result<Vec<ResolvedMarket>, ClientError> {
        self.get_resolved_markets().await
    }

    async fn fetch_bets(&self, market_id: &str) -> Result<Vec<Bet>, ClientError> {
        self.get_bets(market_id).await
    }
}
