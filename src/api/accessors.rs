//! Typed accessors over the request client and cache.
//!
//! UI code consumes these instead of touching [`ApiClient`] or
//! [`CacheStore`] directly. Read accessors consult the cache with a TTL
//! chosen per resource class; mutating accessors invalidate the cached read
//! families they affect.

use color_eyre::Result;
use tracing::warn;

use crate::auth::TokenProvider;
use crate::cache::{CacheMode, CacheStore, SqliteStorage, StorageBackend};
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::ApiError;

use super::types::{
  DashboardSnapshot, Listing, MarketSummary, Property, PropertyInput, SearchFilters, Suggestion,
  TaxRates,
};

/// TTL for short-lived search and autocomplete results.
const SEARCH_TTL_MS: i64 = 10 * 60 * 1000;
/// TTL for list and summary endpoints that change slowly.
const SUMMARY_TTL_MS: i64 = 30 * 60 * 1000;

const SEARCH_PATH: &str = "/search/listings";
const SUGGEST_PATH: &str = "/search/suggest";
const PROPERTIES_PATH: &str = "/portfolio/properties";

/// Propfolio API client with a local response cache.
///
/// Wraps the resilient request client and provides one typed method per
/// backend resource.
pub struct PropfolioClient<S: StorageBackend> {
  api: ApiClient,
  cache: CacheStore<S>,
  cache_enabled: bool,
}

impl PropfolioClient<SqliteStorage> {
  /// Create a client with the durable cache from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let api = ApiClient::new(config)?;

    let storage = match &config.cache.dir {
      Some(dir) => SqliteStorage::open_at(&dir.join("cache.db"), config.cache.max_bytes)?,
      None => SqliteStorage::open(config.cache.max_bytes)?,
    };
    let cache = CacheStore::new(storage, config.cache.namespace.clone());

    Ok(Self {
      api,
      cache,
      cache_enabled: config.cache.enabled,
    })
  }
}

impl<S: StorageBackend> PropfolioClient<S> {
  /// Create a client over an explicit cache store.
  pub fn with_cache(api: ApiClient, cache: CacheStore<S>) -> Self {
    Self {
      api,
      cache,
      cache_enabled: true,
    }
  }

  /// The credential provider; set or clear the bearer token here on
  /// login/logout transitions.
  pub fn tokens(&self) -> &TokenProvider {
    self.api.tokens()
  }

  /// Drop the session's credentials and every cached response. Called on
  /// logout so the next login starts from live data.
  pub fn clear_session(&self) {
    self.api.tokens().clear_token();
    self.cache.clear_all();
  }

  /// Search listings matching `filters`. Cached for 10 minutes per filter
  /// combination.
  pub async fn search_listings(
    &self,
    filters: &SearchFilters,
    mode: CacheMode,
  ) -> Result<Vec<Listing>, ApiError> {
    let params = filters.cache_params();

    if self.reads_cache(mode) {
      if let Some(hit) = self.cache.get::<Vec<Listing>>(SEARCH_PATH, &params) {
        return Ok(hit);
      }
    }

    let listings: Vec<Listing> = self.api.get(SEARCH_PATH, &filters.query_pairs()).await?;
    if self.writes_cache(mode) {
      self.cache.set(SEARCH_PATH, &params, &listings, SEARCH_TTL_MS);
    }
    Ok(listings)
  }

  /// Location autocomplete. Cached for 10 minutes per prefix; degrades to
  /// an empty list on failure since suggestions are never load-bearing.
  pub async fn suggest_locations(&self, prefix: &str) -> Result<Vec<Suggestion>, ApiError> {
    let params = [("q", serde_json::json!(prefix))];

    if self.cache_enabled {
      if let Some(hit) = self.cache.get::<Vec<Suggestion>>(SUGGEST_PATH, &params) {
        return Ok(hit);
      }
    }

    match self
      .api
      .get::<Vec<Suggestion>>(SUGGEST_PATH, &[("q", prefix.to_string())])
      .await
    {
      Ok(suggestions) => {
        if self.cache_enabled {
          self.cache.set(SUGGEST_PATH, &params, &suggestions, SEARCH_TTL_MS);
        }
        Ok(suggestions)
      }
      Err(e) => {
        warn!(error = %e, "Autocomplete fetch failed, returning no suggestions");
        Ok(Vec::new())
      }
    }
  }

  /// Aggregate market statistics for a region. Cached for 30 minutes.
  pub async fn market_summary(
    &self,
    region: &str,
    mode: CacheMode,
  ) -> Result<MarketSummary, ApiError> {
    let path = format!("/market/{}/summary", region);

    if self.reads_cache(mode) {
      if let Some(hit) = self.cache.get::<MarketSummary>(&path, &[]) {
        return Ok(hit);
      }
    }

    let summary: MarketSummary = self.api.get(&path, &[]).await?;
    if self.writes_cache(mode) {
      self.cache.set(&path, &[], &summary, SUMMARY_TTL_MS);
    }
    Ok(summary)
  }

  /// Property tax rates for a region, for the tax calculator. Cached for
  /// 30 minutes; rates change on assessment cycles, not minutes.
  pub async fn tax_rates(&self, region: &str) -> Result<TaxRates, ApiError> {
    let path = format!("/taxes/{}/rates", region);

    if self.cache_enabled {
      if let Some(hit) = self.cache.get::<TaxRates>(&path, &[]) {
        return Ok(hit);
      }
    }

    let rates: TaxRates = self.api.get(&path, &[]).await?;
    if self.cache_enabled {
      self.cache.set(&path, &[], &rates, SUMMARY_TTL_MS);
    }
    Ok(rates)
  }

  /// The user's portfolio. Cached for 30 minutes; mutations below
  /// invalidate it.
  pub async fn list_properties(&self, mode: CacheMode) -> Result<Vec<Property>, ApiError> {
    if self.reads_cache(mode) {
      if let Some(hit) = self.cache.get::<Vec<Property>>(PROPERTIES_PATH, &[]) {
        return Ok(hit);
      }
    }

    let properties: Vec<Property> = self.api.get(PROPERTIES_PATH, &[]).await?;
    if self.writes_cache(mode) {
      self.cache.set(PROPERTIES_PATH, &[], &properties, SUMMARY_TTL_MS);
    }
    Ok(properties)
  }

  /// One portfolio property, always read live (the detail view follows an
  /// edit too often for caching to pay off).
  pub async fn get_property(&self, id: u64) -> Result<Property, ApiError> {
    self
      .api
      .get(&format!("{}/{}", PROPERTIES_PATH, id), &[])
      .await
  }

  /// Add a property to the portfolio.
  pub async fn create_property(&self, input: &PropertyInput) -> Result<Property, ApiError> {
    let property: Property = self.api.post(PROPERTIES_PATH, input).await?;
    self.invalidate_portfolio_reads();
    Ok(property)
  }

  /// Update a portfolio property.
  pub async fn update_property(
    &self,
    id: u64,
    input: &PropertyInput,
  ) -> Result<Property, ApiError> {
    let property: Property = self
      .api
      .put(&format!("{}/{}", PROPERTIES_PATH, id), input)
      .await?;
    self.invalidate_portfolio_reads();
    Ok(property)
  }

  /// Remove a property from the portfolio.
  pub async fn delete_property(&self, id: u64) -> Result<(), ApiError> {
    self
      .api
      .delete(&format!("{}/{}", PROPERTIES_PATH, id))
      .await?;
    self.invalidate_portfolio_reads();
    Ok(())
  }

  /// Market statistics and portfolio for the dashboard, fetched
  /// concurrently.
  pub async fn dashboard(&self, region: &str) -> Result<DashboardSnapshot, ApiError> {
    let (market, properties) = futures::try_join!(
      self.market_summary(region, CacheMode::Use),
      self.list_properties(CacheMode::Use),
    )?;

    Ok(DashboardSnapshot { market, properties })
  }

  /// Portfolio mutations change what searches and portfolio lists should
  /// return, so drop every cached entry in those families.
  fn invalidate_portfolio_reads(&self) {
    self.cache.delete(PROPERTIES_PATH, &[]);
    self.cache.delete_by_pattern("^/search/");
  }

  fn reads_cache(&self, mode: CacheMode) -> bool {
    self.cache_enabled && mode == CacheMode::Use
  }

  fn writes_cache(&self, mode: CacheMode) -> bool {
    self.cache_enabled && mode != CacheMode::Bypass
  }
}

impl<S: StorageBackend> Clone for PropfolioClient<S> {
  fn clone(&self) -> Self {
    Self {
      api: self.api.clone(),
      cache: self.cache.clone(),
      cache_enabled: self.cache_enabled,
    }
  }
}
