//! HTTP client implementation.
//!
//! Provides the client for the L2 endpoints consumed by the settlement
//! indexer.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize};

use super::config::ClientConfig;
use super::error::ClientError;
use crate::types::{Bet, ResolvedMarket, SettlementEvent};

/// API error response format.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// Settlement feed response.
#[derive(Debug, Deserialize)]
struct SettlementsResponse {
    #[serde(default)]
    events: Vec<SettlementEvent>,
}

/// List endpoints answer either with a bare array or a wrapping object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Markets { markets: Vec<T> },
    Bets { bets: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Markets { markets: items } | Self::Bets { bets: items } => {
                items
            }
        }
    }
}

/// HTTP client for the PRISM L2 service.
#[derive(Debug, Clone)]
pub struct L2Client {
    config: ClientConfig,
    http: reqwest::Client,
}

impl L2Client {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|_| ClientError::InvalidConfig("api_key is not a valid header".into()))?;
            headers.insert("X-API-Key", value);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { config, http })
    }

    /// Creates a new client with the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::new(base_url))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds an absolute URL for `path` with encoded query parameters.
    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ClientError> {
        let raw = format!("{}{}", self.config.base_url, path);
        Url::parse_with_params(&raw, params)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid url {}: {}", raw, e)))
    }

    /// Makes a GET request to the given URL.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        self.request_with_retry(url.path(), || self.http.get(url.clone()))
            .await
    }

    /// Makes a request with retry logic.
    ///
    /// Timeouts back off exponentially; 429 responses wait for
    /// `Retry-After` (default one second). Both are bounded by
    /// `max_retries`.
    async fn request_with_retry<T, F>(&self, path: &str, request_fn: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;

        loop {
            let resp = match request_fn().send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if e.is_timeout() && retry_count < self.config.max_retries {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_millis(100 * (1 << retry_count))).await;
                        continue;
                    }
                    return Err(ClientError::from(e));
                }
            };

            let status = resp.status();

            if status.is_success() {
                let body = resp
                    .text()
                    .await
                    .map_err(|e| ClientError::Deserialization(e.to_string()))?;

                return serde_json::from_str(&body)
                    .map_err(|e| ClientError::Deserialization(e.to_string()));
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());

                if retry_count < self.config.max_retries {
                    let wait_time = retry_after.unwrap_or(1);
                    tokio::time::sleep(Duration::from_secs(wait_time)).await;
                    retry_count += 1;
                    continue;
                }

                return Err(ClientError::RateLimited { retry_after });
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ClientError::NotFound(path.to_string()));
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ClientError::Unauthorized);
            }

            let body = resp.text().await.unwrap_or_default();
            if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(ClientError::Api {
                    code: error_resp
                        .code
                        .unwrap_or_else(|| status.as_str().to_string()),
                    message: error_resp.error,
                });
            }

            return Err(ClientError::Api {
                code: status.as_str().to_string(),
                message: body,
            });
        }
    }

    /// Gets settlement events starting at `from_block`.
    ///
    /// Older L2 builds do not expose this endpoint; they answer with
    /// [`ClientError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_settlement_events(
        &self,
        from_block: u64,
    ) -> Result<Vec<SettlementEvent>, ClientError> {
        let from_block = from_block.to_string();
        let url = self.url("/events/settlements", &[("from_block", from_block.as_str())])?;
        let response: SettlementsResponse = self.get(url).await?;
        Ok(response.events)
    }

    /// Gets all resolved markets.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_resolved_markets(&self) -> Result<Vec<ResolvedMarket>, ClientError> {
        let url = self.url("/markets", &[("status", "resolved")])?;
        let response: ListResponse<ResolvedMarket> = self.get(url).await?;
        Ok(response.into_vec())
    }

    /// Gets every bet placed on a market.
    ///
    /// # Arguments
    ///
    /// * `market_id` - The market identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_bets(&self, market_id: &str) -> Result<Vec<Bet>, ClientError> {
        let url = self.url("/bets", &[("market_id", market_id)])?;
        let response: ListResponse<Bet> = self.get(url).await?;
        Ok(response.into_vec())
    }
}
