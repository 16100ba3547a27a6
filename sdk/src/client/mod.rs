//! HTTP client for the PRISM L2 service.
//!
//! Covers the three endpoints the settlement indexer reads:
//! the settlement event feed, the resolved market listing used as a
//! fallback, and the per-market bet listing.
//!
//! # Example
//!
//! ```rust,ignore
//! use prism_sdk::client::{ClientConfig, L2Client};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = L2Client::new(ClientConfig::new("http://localhost:1234"))?;
//!
//!     let events = client.get_settlement_events(0).await?;
//!     println!("Found {} settlement events", events.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::L2Client;
