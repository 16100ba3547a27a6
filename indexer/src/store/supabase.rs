//! Supabase PostgREST history store.
//!
//! Talks to `/rest/v1/{table}` with the service role key. Upserts use
//! `on_conflict` on the natural key and `Prefer: resolution=merge-duplicates`;
//! the audit log and profiles use `resolution=ignore-duplicates` so existing
//! rows are never overwritten.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_sdk::SettlementEvent;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HistoryStore, StoreError};
use crate::events::{
    BetHistoryRecord, ContestHistoryRecord, EntryHistoryRecord, IndexerState, IndexerStatus,
    MarketHistoryRecord, OutcomeHistoryRecord, ProfileRecord, StateUpdate,
};

const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=minimal";
const IGNORE_DUPLICATES: &str = "resolution=ignore-duplicates,return=minimal";
const RETURN_MINIMAL: &str = "return=minimal";
const RETURN_REPRESENTATION: &str = "return=representation";

/// Connection settings for the PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,

    /// Service role key; bypasses row level security.
    pub service_role_key: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl SupabaseConfig {
    /// Creates a config with a 10 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Row of `l2_events` as inserted.
#[derive(Debug, Serialize)]
struct EventRow<'a> {
    transaction_hash: &'a str,
    event_type: &'a str,
    block_number: u64,
    event_timestamp: &'a str,
    data: &'a Value,
    processed: bool,
}

/// Row of `indexer_state` as read.
#[derive(Debug, Deserialize)]
struct StateRow {
    last_synced_block: u64,
    last_synced_at: Option<DateTime<Utc>>,
    total_events_processed: u64,
    status: IndexerStatus,
    error_message: Option<String>,
}

impl From<StateRow> for IndexerState {
    fn from(row: StateRow) -> Self {
        Self {
            last_synced_block: row.last_synced_block,
            last_synced_at: row.last_synced_at,
            total_events_processed: row.total_events_processed,
            status: row.status,
            error_message: row.error_message,
        }
    }
}

/// Projection of `l2_events` on its `processed` column.
#[derive(Debug, Deserialize)]
struct ProcessedRow {
    processed: bool,
}

/// Body of a partial `indexer_state` update.
#[derive(Debug, Serialize)]
struct StatePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_synced_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_events_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<IndexerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<Option<&'a str>>,
    updated_at: DateTime<Utc>,
}

impl<'a> StatePatch<'a> {
    fn from_update(update: &'a StateUpdate) -> Self {
        Self {
            last_synced_block: update.last_synced_block,
            last_synced_at: update.last_synced_at,
            total_events_processed: update.total_events_processed,
            status: update.status,
            error_message: update.error_message.as_ref().map(|m| m.as_deref()),
            updated_at: Utc::now(),
        }
    }
}

/// History store over Supabase PostgREST.
#[derive(Debug, Clone)]
pub struct SupabaseHistoryStore {
    rest_url: String,
    http: reqwest::Client,
}

impl SupabaseHistoryStore {
    /// Creates a store for the given project.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let headers = auth_headers(&config.service_role_key)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            rest_url: format!("{}/rest/v1", config.url),
            http,
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url, StoreError> {
        let raw = format!("{}/{}", self.rest_url, table);
        Url::parse_with_params(&raw, params)
            .map_err(|e| StoreError::InvalidData(format!("invalid url {}: {}", raw, e)))
    }

    /// Sends a request and maps non-success statuses to [`StoreError::Api`].
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let resp = request.send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn upsert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        prefer: &'static str,
        body: &T,
    ) -> Result<(), StoreError> {
        let url = self.table_url(table, &[("on_conflict", on_conflict)])?;
        self.send(
            self.http
                .request(Method::POST, url)
                .header("Prefer", prefer)
                .json(body),
        )
        .await?;
        Ok(())
    }

    async fn patch<T: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: (&str, &str),
        prefer: &'static str,
        body: &T,
    ) -> Result<reqwest::Response, StoreError> {
        let eq = format!("eq.{}", filter.1);
        let url = self.table_url(table, &[(filter.0, eq.as_str())])?;
        self.send(
            self.http
                .request(Method::PATCH, url)
                .header("Prefer", prefer)
                .json(body),
        )
        .await
    }
}

fn auth_headers(service_role_key: &str) -> Result<HeaderMap, StoreError> {
    let invalid = |_| StoreError::InvalidData("service role key is not a valid header".into());

    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(service_role_key).map_err(invalid)?);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", service_role_key)).map_err(invalid)?,
    );
    Ok(headers)
}

#[async_trait]
impl HistoryStore for SupabaseHistoryStore {
    async fn load_state(&self) -> Result<IndexerState, StoreError> {
        let url = self.table_url("indexer_state", &[("id", "eq.1"), ("select", "*")])?;
        let rows: Vec<StateRow> = self.send(self.http.get(url)).await?.json().await?;

        rows.into_iter()
            .next()
            .map(IndexerState::from)
            .ok_or(StoreError::StateMissing)
    }

    async fn update_state(&self, update: &StateUpdate) -> Result<(), StoreError> {
        // PATCH answers 2xx even when the filter matches nothing.
        let rows: Vec<Value> = self
            .patch(
                "indexer_state",
                ("id", "1"),
                RETURN_REPRESENTATION,
                &StatePatch::from_update(update),
            )
            .await?
            .json()
            .await?;

        if rows.is_empty() {
            return Err(StoreError::StateMissing);
        }
        Ok(())
    }

    async fn record_event(&self, event: &SettlementEvent) -> Result<(), StoreError> {
        let row = EventRow {
            transaction_hash: &event.transaction_hash,
            event_type: event.event_type.as_str(),
            block_number: event.block_number,
            event_timestamp: &event.timestamp,
            data: &event.data,
            processed: false,
        };
        self.upsert("l2_events", "transaction_hash", IGNORE_DUPLICATES, &row)
            .await
    }

    async fn mark_event_processed(
        &self,
        transaction_hash: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "processed": true,
            "processed_at": processed_at,
            "error_message": Value::Null,
        });
        self.patch(
            "l2_events",
            ("transaction_hash", transaction_hash),
            RETURN_MINIMAL,
            &body,
        )
        .await?;
        Ok(())
    }

    async fn mark_event_failed(
        &self,
        transaction_hash: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "processed": false,
            "error_message": error,
        });
        self.patch(
            "l2_events",
            ("transaction_hash", transaction_hash),
            RETURN_MINIMAL,
            &body,
        )
        .await?;
        Ok(())
    }

    async fn event_processed(&self, transaction_hash: &str) -> Result<Option<bool>, StoreError> {
        let eq = format!("eq.{}", transaction_hash);
        let url = self.table_url(
            "l2_events",
            &[
                ("transaction_hash", eq.as_str()),
                ("select", "processed"),
                ("limit", "1"),
            ],
        )?;
        let rows: Vec<ProcessedRow> = self.send(self.http.get(url)).await?.json().await?;
        Ok(rows.first().map(|row| row.processed))
    }

    async fn upsert_market(&self, record: &MarketHistoryRecord) -> Result<(), StoreError> {
        self.upsert("market_history", "market_id", MERGE_DUPLICATES, record)
            .await
    }

    async fn upsert_outcomes(&self, records: &[OutcomeHistoryRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.upsert(
            "market_outcome_history",
            "market_id,outcome_id",
            MERGE_DUPLICATES,
            records,
        )
        .await
    }

    async fn upsert_bet(&self, record: &BetHistoryRecord) -> Result<(), StoreError> {
        self.upsert("bet_history", "bet_id", MERGE_DUPLICATES, record)
            .await
    }

    async fn upsert_contest(&self, record: &ContestHistoryRecord) -> Result<(), StoreError> {
        self.upsert("contest_history", "contest_id", MERGE_DUPLICATES, record)
            .await
    }

    async fn upsert_entry(&self, record: &EntryHistoryRecord) -> Result<(), StoreError> {
        self.upsert("contest_entry_history", "entry_id", MERGE_DUPLICATES, record)
            .await
    }

    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError> {
        self.upsert("profiles", "wallet_address", IGNORE_DUPLICATES, record)
            .await
    }

    async fn has_market(&self, market_id: &str) -> Result<bool, StoreError> {
        let eq = format!("eq.{}", market_id);
        let url = self.table_url(
            "market_history",
            &[
                ("market_id", eq.as_str()),
                ("select", "market_id"),
                ("limit", "1"),
            ],
        )?;
        let rows: Vec<Value> = self.send(self.http.get(url)).await?.json().await?;
        Ok(!rows.is_empty())
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}
