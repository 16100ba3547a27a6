//! Sync cursor and indexer control state.
//!
//! [`BlockCursor`] tracks the resume position in the settlement stream.
//! [`IndexerState`] is the singleton control row persisted by the store;
//! [`StateUpdate`] carries a partial write of it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cursor over the settlement event stream.
///
/// Never moves backwards. A `last_synced_block` of 0 means nothing has
/// been synced yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCursor {
    /// Highest block whose events were all processed.
    pub last_synced_block: u64,

    /// Events processed since the cursor was created.
    pub events_processed: u64,
}

impl BlockCursor {
    /// Creates a cursor resuming at the given block.
    #[must_use]
    pub const fn new(last_synced_block: u64) -> Self {
        Self {
            last_synced_block,
            events_processed: 0,
        }
    }

    /// Returns true if events in `block` are already covered by the cursor.
    #[must_use]
    pub const fn is_synced(&self, block: u64) -> bool {
        self.last_synced_block > 0 && block <= self.last_synced_block
    }

    /// Records one processed event at `block`.
    ///
    /// The cursor advances to `block` only if it is ahead of the current
    /// position.
    pub fn mark_processed(&mut self, block: u64) {
        self.events_processed = self.events_processed.saturating_add(1);
        self.advance(block);
    }

    /// Moves the cursor to `block` without counting an event.
    pub fn advance(&mut self, block: u64) {
        if block > self.last_synced_block {
            self.last_synced_block = block;
        }
    }

    /// Returns the block to request from the event feed.
    #[must_use]
    pub const fn from_block(&self) -> u64 {
        self.last_synced_block
    }
}

/// Run status of the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerStatus {
    /// Syncing normally.
    #[default]
    Running,
    /// Stopped by an operator or a shutdown signal.
    Paused,
    /// The last sync cycle failed.
    Error,
}

impl IndexerStatus {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for IndexerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown indexer status: {}", other)),
        }
    }
}

/// The singleton `indexer_state` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerState {
    /// Resume cursor.
    pub last_synced_block: u64,

    /// Time of the last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Monotonic count of processed events.
    pub total_events_processed: u64,

    /// Run status.
    pub status: IndexerStatus,

    /// Detail of the last failure; cleared on success.
    pub error_message: Option<String>,
}

impl IndexerState {
    /// Returns a cursor positioned at this state's resume block.
    #[must_use]
    pub const fn cursor(&self) -> BlockCursor {
        BlockCursor::new(self.last_synced_block)
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &StateUpdate) {
        if let Some(block) = update.last_synced_block {
            self.last_synced_block = block;
        }
        if let Some(at) = update.last_synced_at {
            self.last_synced_at = Some(at);
        }
        if let Some(total) = update.total_events_processed {
            self.total_events_processed = total;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref message) = update.error_message {
            self.error_message = message.clone();
        }
    }
}

/// Partial update of [`IndexerState`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    /// New resume cursor.
    pub last_synced_block: Option<u64>,

    /// New last sync time.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// New processed total.
    pub total_events_processed: Option<u64>,

    /// New status.
    pub status: Option<IndexerStatus>,

    /// `Some(None)` clears the error, `Some(Some(msg))` sets it.
    pub error_message: Option<Option<String>>,
}

impl StateUpdate {
    /// Update written after a successful cycle.
    #[must_use]
    pub fn synced(last_synced_block: u64, at: DateTime<Utc>, total_events_processed: u64) -> Self {
        Self {
            last_synced_block: Some(last_synced_block),
            last_synced_at: Some(at),
            total_events_processed: Some(total_events_processed),
            status: Some(IndexerStatus::Running),
            error_message: Some(None),
        }
    }

    /// Update written after a failed cycle. The cursor is left untouched.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(IndexerStatus::Error),
            error_message: Some(Some(message.into())),
            ..Default::default()
        }
    }

    /// Update that only changes the status.
    #[must_use]
    pub fn status(status: IndexerStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
