use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One listing returned by a market search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
  pub id: u64,
  pub address: String,
  pub price: u64,
  pub bedrooms: Option<u8>,
  pub bathrooms: Option<u8>,
  pub area_sqft: Option<u32>,
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
}

/// Filters for a listing search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
  pub region: String,
  pub query: Option<String>,
  pub min_price: Option<u64>,
  pub max_price: Option<u64>,
  pub min_bedrooms: Option<u8>,
}

impl SearchFilters {
  /// Filters matching everything in a region.
  pub fn for_region(region: impl Into<String>) -> Self {
    Self {
      region: region.into(),
      ..Self::default()
    }
  }

  /// The filters as URL query pairs.
  pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = vec![("region", self.region.clone())];
    if let Some(q) = &self.query {
      pairs.push(("q", q.clone()));
    }
    if let Some(min) = self.min_price {
      pairs.push(("min_price", min.to_string()));
    }
    if let Some(max) = self.max_price {
      pairs.push(("max_price", max.to_string()));
    }
    if let Some(beds) = self.min_bedrooms {
      pairs.push(("min_bedrooms", beds.to_string()));
    }
    pairs
  }

  /// The filters as cache key parameters.
  pub(crate) fn cache_params(&self) -> Vec<(&'static str, Value)> {
    let mut params = vec![("region", json!(self.region))];
    if let Some(q) = &self.query {
      params.push(("q", json!(q)));
    }
    if let Some(min) = self.min_price {
      params.push(("min_price", json!(min)));
    }
    if let Some(max) = self.max_price {
      params.push(("max_price", json!(max)));
    }
    if let Some(beds) = self.min_bedrooms {
      params.push(("min_bedrooms", json!(beds)));
    }
    params
  }
}

/// A location autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
  pub label: String,
  pub region: Option<String>,
}

/// Aggregate market statistics for a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
  pub region: String,
  pub median_price: f64,
  pub yoy_change_pct: f64,
  pub active_listings: u64,
  pub median_days_on_market: u32,
}

/// Property tax rates for a region, for the tax calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRates {
  pub region: String,
  pub municipal_rate: f64,
  pub education_rate: f64,
  pub assessment_year: u16,
}

/// A property in the user's portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub id: u64,
  pub address: String,
  pub purchase_price: u64,
  pub purchase_date: Option<NaiveDate>,
  pub current_value: Option<u64>,
  pub notes: Option<String>,
}

/// Fields for creating or updating a portfolio property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInput {
  pub address: String,
  pub purchase_price: u64,
  pub purchase_date: Option<NaiveDate>,
  pub notes: Option<String>,
}

/// Everything the dashboard view needs in one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
  pub market: MarketSummary,
  pub properties: Vec<Property>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_query_pairs_skip_unset_filters() {
    let filters = SearchFilters::for_region("van");
    assert_eq!(filters.query_pairs(), vec![("region", "van".to_string())]);
  }

  #[test]
  fn test_query_pairs_include_set_filters() {
    let filters = SearchFilters {
      region: "van".to_string(),
      query: Some("river".to_string()),
      max_price: Some(750_000),
      ..SearchFilters::default()
    };

    let pairs = filters.query_pairs();
    assert!(pairs.contains(&("q", "river".to_string())));
    assert!(pairs.contains(&("max_price", "750000".to_string())));
    assert!(!pairs.iter().any(|(name, _)| *name == "min_price"));
  }
}
