//! Indexer error types.

use prism_sdk::{ClientError, SdkError};

use crate::feed::FetchError;
use crate::store::StoreError;

/// Errors raised while syncing or processing settlements.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Historical store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// L2 request failure.
    #[error("l2 error: {0}")]
    Client(#[from] ClientError),

    /// Event payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] SdkError),

    /// Neither the settlement feed nor the fallback produced events.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl IndexerError {
    /// Returns true if the failure came from a timeout or rate limit on the
    /// L2 and says nothing about the event itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Fetch(FetchError::Unavailable { primary, .. }) => primary.is_transient(),
            Self::Store(_) | Self::Decode(_) => false,
        }
    }
}
