//! Canonical cache key construction.

use serde_json::Value;

/// Build the storage key for a resource path and its parameters.
///
/// The key is `namespace + path + canonical parameter string`. Parameters
/// are sorted by name before serialization, so logically identical parameter
/// sets always collide to the same key regardless of construction order.
/// The portion after the namespace stays human-readable so that
/// pattern-based invalidation can match on it.
pub fn canonical_key(namespace: &str, path: &str, params: &[(&str, Value)]) -> String {
  let mut key = String::with_capacity(namespace.len() + path.len());
  key.push_str(namespace);
  key.push_str(path);
  key.push_str(&canonical_params(params));
  key
}

/// Canonical serialization of a parameter set.
///
/// Empty sets contribute nothing. Otherwise parameters render as a sorted
/// `?name=value&...` string, with non-string values in compact JSON.
pub fn canonical_params(params: &[(&str, Value)]) -> String {
  if params.is_empty() {
    return String::new();
  }

  let mut sorted: Vec<&(&str, Value)> = params.iter().collect();
  sorted.sort_by(|a, b| a.0.cmp(b.0));

  let mut out = String::from("?");
  for (i, (name, value)) in sorted.iter().enumerate() {
    if i > 0 {
      out.push('&');
    }
    out.push_str(name);
    out.push('=');
    match value {
      Value::String(s) => out.push_str(s),
      other => out.push_str(&other.to_string()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_key_is_order_independent() {
    let a = canonical_key(
      "propfolio:",
      "/search/listings",
      &[("region", json!("van")), ("q", json!("river")), ("beds", json!(2))],
    );
    let b = canonical_key(
      "propfolio:",
      "/search/listings",
      &[("beds", json!(2)), ("q", json!("river")), ("region", json!("van"))],
    );
    assert_eq!(a, b);
  }

  #[test]
  fn test_key_shape() {
    let key = canonical_key(
      "propfolio:",
      "/search/listings",
      &[("q", json!("river")), ("beds", json!(2))],
    );
    assert_eq!(key, "propfolio:/search/listings?beds=2&q=river");
  }

  #[test]
  fn test_empty_params_add_nothing() {
    let key = canonical_key("propfolio:", "/portfolio/properties", &[]);
    assert_eq!(key, "propfolio:/portfolio/properties");
  }

  #[test]
  fn test_non_string_values_render_as_json() {
    let params = canonical_params(&[
      ("max_price", json!(750000)),
      ("active", json!(true)),
      ("tags", json!(["new", "waterfront"])),
    ]);
    assert_eq!(params, "?active=true&max_price=750000&tags=[\"new\",\"waterfront\"]");
  }

  #[test]
  fn test_different_params_produce_different_keys() {
    let a = canonical_key("ns:", "/search", &[("q", json!("river"))]);
    let b = canonical_key("ns:", "/search", &[("q", json!("ocean"))]);
    assert_ne!(a, b);
  }
}
