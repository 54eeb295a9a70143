//! Typed access to the Propfolio backend's resources.

mod accessors;
mod types;

pub use accessors::PropfolioClient;
pub use types::{
  DashboardSnapshot, Listing, MarketSummary, Property, PropertyInput, SearchFilters, Suggestion,
  TaxRates,
};
