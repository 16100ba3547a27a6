//! Indexer configuration.
//!
//! Read from environment variables; `.env` is loaded by the binary before
//! [`IndexerConfig::from_env`] runs.

use std::str::FromStr;
use std::time::Duration;

use prism_sdk::ClientConfig;

use crate::store::SupabaseConfig;

/// Default L2 base URL.
pub const DEFAULT_L2_API_URL: &str = "http://localhost:1234";

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Default client retries on timeouts and rate limiting.
pub const DEFAULT_HTTP_MAX_RETRIES: u32 = 2;

/// Default number of attempts before an event is dead-lettered.
pub const DEFAULT_MAX_EVENT_ATTEMPTS: u32 = 5;

/// Which history store to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Postgres if a database URL is set, else Supabase REST.
    #[default]
    Auto,
    /// Direct Postgres connection.
    Postgres,
    /// Supabase PostgREST.
    Supabase,
    /// Process memory (dry run).
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "supabase" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidStore(other.to_string())),
        }
    }
}

/// Configuration for the indexer service.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// L2 base URL.
    pub l2_api_url: String,

    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Per-request timeout in milliseconds.
    pub http_timeout_ms: u64,

    /// Client retries on timeouts and rate limiting.
    pub http_max_retries: u32,

    /// Failures after which an event is dead-lettered; 0 never gives up.
    pub max_event_attempts: u32,

    /// Requested store backend.
    pub store: StoreBackend,

    /// Postgres connection string.
    pub database_url: Option<String>,

    /// Supabase project URL.
    pub supabase_url: Option<String>,

    /// Supabase service role key.
    pub supabase_service_role_key: Option<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            l2_api_url: DEFAULT_L2_API_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            http_max_retries: DEFAULT_HTTP_MAX_RETRIES,
            max_event_attempts: DEFAULT_MAX_EVENT_ATTEMPTS,
            store: StoreBackend::Auto,
            database_url: None,
            supabase_url: None,
            supabase_service_role_key: None,
        }
    }
}

/// Store selection after resolving [`StoreBackend::Auto`].
#[derive(Debug, Clone)]
pub enum StoreSettings {
    /// Postgres with this connection string.
    Postgres(String),
    /// Supabase REST with these settings.
    Supabase(SupabaseConfig),
    /// In-memory store.
    Memory,
}

impl IndexerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the result is
    /// invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            l2_api_url: get("L2_API_URL").unwrap_or(defaults.l2_api_url),
            poll_interval_ms: parse_var(&get, "INDEXER_POLL_INTERVAL")?
                .unwrap_or(defaults.poll_interval_ms),
            http_timeout_ms: parse_var(&get, "INDEXER_HTTP_TIMEOUT_MS")?
                .unwrap_or(defaults.http_timeout_ms),
            http_max_retries: parse_var(&get, "INDEXER_HTTP_MAX_RETRIES")?
                .unwrap_or(defaults.http_max_retries),
            max_event_attempts: parse_var(&get, "INDEXER_MAX_EVENT_ATTEMPTS")?
                .unwrap_or(defaults.max_event_attempts),
            store: get("INDEXER_STORE")
                .map(|v| v.parse::<StoreBackend>())
                .transpose()?
                .unwrap_or_default(),
            database_url: get("DATABASE_URL").or_else(|| get("SUPABASE_DB_URL")),
            supabase_url: get("SUPABASE_URL").or_else(|| get("NEXT_PUBLIC_SUPABASE_URL")),
            supabase_service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if self.http_timeout_ms == 0 {
            return Err(ConfigError::InvalidHttpTimeout);
        }

        self.store_settings().map(|_| ())
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Builds the L2 client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.l2_api_url.as_str())
            .with_timeout(self.http_timeout())
            .with_max_retries(self.http_max_retries)
    }

    /// Resolves the store backend against the available credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen backend lacks its credentials.
    pub fn store_settings(&self) -> Result<StoreSettings, ConfigError> {
        match self.store {
            StoreBackend::Memory => Ok(StoreSettings::Memory),
            StoreBackend::Postgres => self
                .database_url
                .clone()
                .map(StoreSettings::Postgres)
                .ok_or(ConfigError::MissingVar("DATABASE_URL")),
            StoreBackend::Supabase => self.supabase().map(StoreSettings::Supabase),
            StoreBackend::Auto => {
                if let Some(url) = &self.database_url {
                    return Ok(StoreSettings::Postgres(url.clone()));
                }
                self.supabase()
                    .map(StoreSettings::Supabase)
                    .map_err(|_| ConfigError::NoStore)
            }
        }
    }

    fn supabase(&self) -> Result<SupabaseConfig, ConfigError> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("SUPABASE_URL"))?;
        let key = self
            .supabase_service_role_key
            .as_deref()
            .ok_or(ConfigError::MissingVar("SUPABASE_SERVICE_ROLE_KEY"))?;

        Ok(SupabaseConfig::new(url, key).with_timeout(self.http_timeout()))
    }
}

fn parse_var<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|v| {
            v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                var: key,
                value: v.clone(),
            })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid poll interval.
    #[error("INDEXER_POLL_INTERVAL must be > 0")]
    InvalidPollInterval,

    /// Invalid request timeout.
    #[error("INDEXER_HTTP_TIMEOUT_MS must be > 0")]
    InvalidHttpTimeout,

    /// A numeric variable did not parse.
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Unknown store backend.
    #[error("INDEXER_STORE must be auto, postgres, supabase or memory, got {0:?}")]
    InvalidStore(String),

    /// A variable required by the chosen store is unset.
    #[error("{0} is required")]
    MissingVar(&'static str),

    /// No store credentials at all.
    #[error("no history store configured: set DATABASE_URL, or SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY")]
    NoStore,
}
