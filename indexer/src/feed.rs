//! Event feed with a resolved-markets fallback.
//!
//! The primary feed is the L2 settlement endpoint. When it fails (older L2
//! builds answer 404), the feed lists resolved markets instead and
//! synthesizes a `MarketResolved` event for each market not yet indexed.
//! A market whose derived event is recorded but unprocessed is derived
//! again until processing completes.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use prism_sdk::{ClientError, SdkError, SettlementEvent};
use tracing::{debug, warn};

use crate::source::SettlementSource;
use crate::store::{HistoryStore, StoreError};

/// Transaction hash prefix of events synthesized by the fallback.
pub const DERIVED_TX_PREFIX: &str = "derived-market-";

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOrigin {
    /// The settlement endpoint.
    Primary,
    /// Synthesized from the resolved-markets listing.
    Fallback,
}

/// Events returned by one fetch.
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    /// Events in feed order.
    pub events: Vec<SettlementEvent>,
    /// Source of the events.
    pub origin: FeedOrigin,
}

impl FetchedBatch {
    /// Returns true if the batch has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Failure of the fallback path.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// Listing resolved markets failed.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// History membership check failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A market could not be turned into an event.
    #[error("{0}")]
    Encode(#[from] SdkError),
}

/// Fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Both the settlement feed and the fallback failed.
    #[error("settlement feed failed ({primary}) and fallback failed ({fallback})")]
    Unavailable {
        /// Settlement endpoint error.
        primary: ClientError,
        /// Fallback error.
        #[source]
        fallback: FallbackError,
    },
}

/// Fetches settlement events for the sync loop.
pub struct EventFeed {
    source: Arc<dyn SettlementSource>,
    store: Arc<dyn HistoryStore>,
}

impl EventFeed {
    /// Creates a feed over a source, using the store for membership checks.
    #[must_use]
    pub fn new(source: Arc<dyn SettlementSource>, store: Arc<dyn HistoryStore>) -> Self {
        Self { source, store }
    }

    /// Fetches events at or after `from_block`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unavailable`] if both paths fail.
    pub async fn fetch(&self, from_block: u64) -> Result<FetchedBatch, FetchError> {
        match self.source.fetch_settlement_events(from_block).await {
            Ok(events) => Ok(FetchedBatch {
                events,
                origin: FeedOrigin::Primary,
            }),
            Err(primary) => {
                if primary.is_not_found() {
                    debug!("Settlement endpoint not available, using resolved markets");
                } else {
                    warn!(error = %primary, "Settlement feed failed, using resolved markets");
                }

                match self.derive_from_markets(from_block).await {
                    Ok(events) => Ok(FetchedBatch {
                        events,
                        origin: FeedOrigin::Fallback,
                    }),
                    Err(fallback) => Err(FetchError::Unavailable { primary, fallback }),
                }
            }
        }
    }

    /// Synthesizes one `MarketResolved` event per resolved market not yet
    /// indexed. Derived events carry `from_block` so the cursor does not
    /// move.
    async fn derive_from_markets(
        &self,
        from_block: u64,
    ) -> Result<Vec<SettlementEvent>, FallbackError> {
        let markets = self.source.fetch_resolved_markets().await?;
        let mut events = Vec::new();

        for market in markets {
            let transaction_hash = format!("{}{}", DERIVED_TX_PREFIX, market.id);
            if self.is_indexed(&market.id, &transaction_hash).await? {
                continue;
            }

            let timestamp = market
                .resolved_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

            events.push(SettlementEvent::market_resolved(
                &market,
                from_block,
                transaction_hash,
                timestamp,
            )?);
        }

        debug!(count = events.len(), "Derived settlement events");
        Ok(events)
    }

    /// A market is indexed once it is in history, unless its derived event
    /// is still recorded as unprocessed. A settlement that fails after the
    /// market row is written leaves exactly that state behind.
    async fn is_indexed(
        &self,
        market_id: &str,
        transaction_hash: &str,
    ) -> Result<bool, StoreError> {
        if !self.store.has_market(market_id).await? {
            return Ok(false);
        }

        let pending = self.store.event_processed(transaction_hash).await? == Some(false);
        if pending {
            debug!(market_id, tx = transaction_hash, "Derived event unfinished, deriving again");
        }
        Ok(!pending)
    }
}
