//! Client-side API access layer for the Propfolio real-estate analytics
//! backend.
//!
//! The crate has two cooperating cores and a typed surface over them:
//!
//! - [`cache`]: a TTL-tagged response cache over durable local key-value
//!   storage, with canonical keys and pattern-based bulk invalidation.
//!   Best-effort by design: a cache failure can never surface as a
//!   business error.
//! - [`client::ApiClient`]: a resilient HTTP client with per-attempt
//!   timeout, bounded linear-backoff retry, bearer-token attachment, and
//!   classified errors.
//! - [`api::PropfolioClient`]: one typed accessor per backend resource
//!   (search, market summaries, tax rates, portfolio CRUD), consulting the
//!   cache where a resource class benefits and invalidating it after
//!   mutations. UI code consumes only this surface.
//!
//! ```no_run
//! use propfolio::{CacheMode, Config, PropfolioClient, SearchFilters};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let config = Config::load(None)?;
//! let client = PropfolioClient::new(&config)?;
//!
//! client.tokens().set_token("bearer-token-from-auth-provider");
//! let listings = client
//!   .search_listings(&SearchFilters::for_region("van"), CacheMode::Use)
//!   .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;

pub use api::{
  DashboardSnapshot, Listing, MarketSummary, Property, PropertyInput, PropfolioClient,
  SearchFilters, Suggestion, TaxRates,
};
pub use auth::TokenProvider;
pub use cache::{CacheMode, CacheStore, MemoryStorage, SqliteStorage, StorageBackend};
pub use client::{ApiClient, RequestOptions};
pub use config::Config;
pub use error::{ApiError, ErrorCode};
