//! Settlement event types.
//!
//! The L2 service publishes settlement events with an opaque `data` object.
//! [`SettlementEvent::payload`] decodes that object into a typed
//! [`EventPayload`] according to the event's [`EventType`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bet::BetSettlement;
use super::contest::SettledContest;
use super::market::ResolvedMarket;
use crate::error::SdkError;

/// Kind of a settlement event.
///
/// Unknown type names are kept verbatim in [`EventType::Other`] so they can
/// be logged and audited, but they never map to a typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A market was resolved with a winning outcome.
    MarketResolved,
    /// A contest was settled by the oracle.
    ContestSettled,
    /// A single bet was settled.
    BetSettled,
    /// Funds were withdrawn from L2.
    Withdrawal,
    /// Any other event type (e.g. live-state events such as placements).
    Other(String),
}

impl EventType {
    /// Returns the wire name of the event type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::MarketResolved => "MarketResolved",
            Self::ContestSettled => "ContestSettled",
            Self::BetSettled => "BetSettled",
            Self::Withdrawal => "Withdrawal",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "MarketResolved" => Self::MarketResolved,
            "ContestSettled" => Self::ContestSettled,
            "BetSettled" => Self::BetSettled,
            "Withdrawal" => Self::Withdrawal,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit payload of a `Withdrawal` event.
///
/// All fields are optional; withdrawals are only recorded in the audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalNotice {
    /// Withdrawal identifier.
    #[serde(default, alias = "withdrawal_id")]
    pub id: Option<String>,

    /// Wallet that withdrew.
    #[serde(default)]
    pub user_address: Option<String>,

    /// Amount withdrawn.
    #[serde(default)]
    pub amount: Option<rust_decimal::Decimal>,

    /// Destination on L1, if reported.
    #[serde(default)]
    pub destination: Option<String>,
}

/// Typed payload of a settlement event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Payload of `MarketResolved`.
    MarketResolved(ResolvedMarket),
    /// Payload of `ContestSettled`.
    ContestSettled(SettledContest),
    /// Payload of `BetSettled`.
    BetSettled(BetSettlement),
    /// Payload of `Withdrawal`.
    Withdrawal(WithdrawalNotice),
    /// Event type with no known payload; carries the type name.
    Unrecognized(String),
}

/// A finalized state transition reported by the L2 service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEvent {
    /// Event kind.
    pub event_type: EventType,

    /// Finalization time (ISO-8601).
    pub timestamp: String,

    /// Block number, used as the resume cursor.
    pub block_number: u64,

    /// Unique transaction hash, used as the idempotency key.
    pub transaction_hash: String,

    /// Raw payload; shape depends on `event_type`.
    #[serde(default)]
    pub data: Value,
}

impl SettlementEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(
        event_type: EventType,
        block_number: u64,
        transaction_hash: impl Into<String>,
        timestamp: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            timestamp: timestamp.into(),
            block_number,
            transaction_hash: transaction_hash.into(),
            data,
        }
    }

    /// Builds a `MarketResolved` event carrying a market snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the market cannot be serialized.
    pub fn market_resolved(
        market: &ResolvedMarket,
        block_number: u64,
        transaction_hash: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Result<Self, SdkError> {
        let data =
            serde_json::to_value(market).map_err(|e| SdkError::Serialization(e.to_string()))?;
        Ok(Self::new(
            EventType::MarketResolved,
            block_number,
            transaction_hash,
            timestamp,
            data,
        ))
    }

    /// Parses the event timestamp, if it is valid RFC 3339.
    #[must_use]
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Decodes `data` into the typed payload for this event's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the shape required
    /// by the event type.
    pub fn payload(&self) -> Result<EventPayload, SdkError> {
        match &self.event_type {
            EventType::MarketResolved => {
                let market: ResolvedMarket = self.decode()?;
                market.validate()?;
                Ok(EventPayload::MarketResolved(market))
            }
            EventType::ContestSettled => {
                let contest: SettledContest = self.decode()?;
                contest.validate()?;
                Ok(EventPayload::ContestSettled(contest))
            }
            EventType::BetSettled => Ok(EventPayload::BetSettled(self.decode_or_default()?)),
            EventType::Withdrawal => Ok(EventPayload::Withdrawal(self.decode_or_default()?)),
            EventType::Other(name) => Ok(EventPayload::Unrecognized(name.clone())),
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, SdkError> {
        serde_json::from_value(self.data.clone()).map_err(|e| SdkError::InvalidPayload {
            event_type: self.event_type.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode_or_default<T: DeserializeOwned + Default>(&self) -> Result<T, SdkError> {
        if self.data.is_null() {
            return Ok(T::default());
        }
        self.decode()
    }
}

/// Parses an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
