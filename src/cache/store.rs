//! TTL-tagged cache store over a storage backend.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::canonical_key;
use super::storage::{StorageBackend, StorageError};

/// Time source for TTL decisions. Injected so expiry and the quota sweep
/// stay testable without wall-clock sleeps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// On-storage shape of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
  data: Value,
  stored_at: DateTime<Utc>,
  ttl_ms: i64,
}

impl CacheEntry {
  /// An entry is valid while `now - stored_at <= ttl`.
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    (now - self.stored_at).num_milliseconds() > self.ttl_ms
  }
}

/// Best-effort cache over durable key-value storage.
///
/// Every operation degrades silently: reads treat any storage or parse
/// failure as a miss, writes and deletes drop their failure. Callers can
/// never receive a cache failure as a business error.
///
/// Keys are namespaced, so several stores can share one backend without
/// seeing each other's entries.
pub struct CacheStore<S: StorageBackend> {
  backend: Arc<S>,
  namespace: String,
  clock: Arc<dyn Clock>,
}

impl<S: StorageBackend> CacheStore<S> {
  /// Create a store over `backend`, scoped to `namespace`.
  pub fn new(backend: S, namespace: impl Into<String>) -> Self {
    Self {
      backend: Arc::new(backend),
      namespace: namespace.into(),
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the time source.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Look up the payload cached for `(path, params)`.
  ///
  /// Returns `None` on a missing key, an expired entry, or an entry that
  /// fails to parse; the latter two are purged as a side effect.
  pub fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, Value)]) -> Option<T> {
    let key = canonical_key(&self.namespace, path, params);

    let raw = match self.backend.read(&key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        debug!(key = %key, error = %e, "Cache read failed, treating as miss");
        return None;
      }
    };

    let entry: CacheEntry = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        debug!(key = %key, error = %e, "Corrupted cache entry, purging");
        self.remove_quietly(&key);
        return None;
      }
    };

    if entry.is_expired(self.clock.now()) {
      self.remove_quietly(&key);
      return None;
    }

    match serde_json::from_value(entry.data) {
      Ok(data) => Some(data),
      Err(e) => {
        debug!(key = %key, error = %e, "Cache payload failed to deserialize, purging");
        self.remove_quietly(&key);
        None
      }
    }
  }

  /// Cache `payload` for `(path, params)` with the given TTL.
  ///
  /// Best-effort: on a quota failure, every currently-expired entry in this
  /// namespace is swept and the write retried once; a second failure is
  /// dropped.
  pub fn set<T: Serialize>(&self, path: &str, params: &[(&str, Value)], payload: &T, ttl_ms: i64) {
    let key = canonical_key(&self.namespace, path, params);

    let data = match serde_json::to_value(payload) {
      Ok(data) => data,
      Err(e) => {
        debug!(key = %key, error = %e, "Cache payload failed to serialize, dropping write");
        return;
      }
    };

    let entry = CacheEntry {
      data,
      stored_at: self.clock.now(),
      ttl_ms,
    };
    let raw = match serde_json::to_string(&entry) {
      Ok(raw) => raw,
      Err(e) => {
        debug!(key = %key, error = %e, "Cache entry failed to serialize, dropping write");
        return;
      }
    };

    match self.backend.write(&key, &raw) {
      Ok(()) => {}
      Err(StorageError::QuotaExceeded) => {
        let swept = self.sweep_expired();
        debug!(key = %key, swept, "Cache quota exceeded, swept expired entries");
        if let Err(e) = self.backend.write(&key, &raw) {
          debug!(key = %key, error = %e, "Cache write failed after sweep, dropping");
        }
      }
      Err(e) => {
        debug!(key = %key, error = %e, "Cache write failed, dropping");
      }
    }
  }

  /// Remove exactly the entry for `(path, params)`, if present.
  pub fn delete(&self, path: &str, params: &[(&str, Value)]) {
    let key = canonical_key(&self.namespace, path, params);
    self.remove_quietly(&key);
  }

  /// Remove every entry in this namespace whose cache-local suffix matches
  /// `pattern`. Used after mutations to invalidate a family of related
  /// reads. Keys from other namespaces are never touched.
  pub fn delete_by_pattern(&self, pattern: &str) {
    let regex = match Regex::new(pattern) {
      Ok(regex) => regex,
      Err(e) => {
        warn!(pattern, error = %e, "Invalid cache invalidation pattern, skipping");
        return;
      }
    };

    for key in self.namespace_keys() {
      let suffix = &key[self.namespace.len()..];
      if regex.is_match(suffix) {
        self.remove_quietly(&key);
      }
    }
  }

  /// Remove every entry in this namespace.
  pub fn clear_all(&self) {
    for key in self.namespace_keys() {
      self.remove_quietly(&key);
    }
  }

  /// Delete every expired (or unreadable) entry in this namespace.
  /// Returns how many entries were removed.
  fn sweep_expired(&self) -> usize {
    let now = self.clock.now();
    let mut removed = 0;

    for key in self.namespace_keys() {
      let expired = match self.backend.read(&key) {
        Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
          Ok(entry) => entry.is_expired(now),
          // An entry the sweep cannot parse is dead weight.
          Err(_) => true,
        },
        Ok(None) => false,
        Err(_) => false,
      };

      if expired {
        self.remove_quietly(&key);
        removed += 1;
      }
    }

    removed
  }

  fn namespace_keys(&self) -> Vec<String> {
    match self.backend.keys(&self.namespace) {
      Ok(keys) => keys,
      Err(e) => {
        debug!(error = %e, "Cache key scan failed");
        Vec::new()
      }
    }
  }

  fn remove_quietly(&self, key: &str) {
    if let Err(e) = self.backend.remove(key) {
      debug!(key = %key, error = %e, "Cache delete failed, dropping");
    }
  }
}

impl<S: StorageBackend> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      namespace: self.namespace.clone(),
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use chrono::TimeZone;
  use serde_json::json;
  use std::sync::Mutex;

  /// Clock that only moves when told to.
  struct ManualClock {
    now: Mutex<DateTime<Utc>>,
  }

  impl ManualClock {
    fn starting_at_epoch() -> Arc<Self> {
      Arc::new(Self {
        now: Mutex::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
      })
    }

    fn advance_ms(&self, ms: i64) {
      let mut now = self.now.lock().unwrap();
      *now += chrono::Duration::milliseconds(ms);
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
      *self.now.lock().unwrap()
    }
  }

  fn store_with_clock() -> (CacheStore<MemoryStorage>, Arc<ManualClock>) {
    let clock = ManualClock::starting_at_epoch();
    let store = CacheStore::new(MemoryStorage::new(), "propfolio:").with_clock(clock.clone());
    (store, clock)
  }

  fn backend_keys(store: &CacheStore<MemoryStorage>) -> Vec<String> {
    store.backend.keys("").unwrap()
  }

  #[test]
  fn test_set_then_get_roundtrip() {
    let (store, _clock) = store_with_clock();
    let listings = vec!["12 River Rd".to_string(), "48 Ocean Ave".to_string()];

    store.set("/search/apartments", &[("q", json!("river"))], &listings, 600_000);

    let hit: Option<Vec<String>> = store.get("/search/apartments", &[("q", json!("river"))]);
    assert_eq!(hit, Some(listings));
  }

  #[test]
  fn test_get_matches_any_param_order() {
    let (store, _clock) = store_with_clock();

    store.set(
      "/search/listings",
      &[("region", json!("van")), ("q", json!("river"))],
      &42u32,
      600_000,
    );

    let hit: Option<u32> = store.get(
      "/search/listings",
      &[("q", json!("river")), ("region", json!("van"))],
    );
    assert_eq!(hit, Some(42));
  }

  #[test]
  fn test_expired_entry_is_a_miss_and_purged() {
    let (store, clock) = store_with_clock();

    store.set("/search/apartments", &[("q", json!("river"))], &vec![1, 2, 3], 600_000);
    clock.advance_ms(601_000);

    let hit: Option<Vec<i32>> = store.get("/search/apartments", &[("q", json!("river"))]);
    assert_eq!(hit, None);
    assert!(backend_keys(&store).is_empty(), "expired entry should be purged");
  }

  #[test]
  fn test_entry_is_valid_up_to_its_ttl() {
    let (store, clock) = store_with_clock();

    store.set("/market/van/summary", &[], &"fresh", 600_000);
    clock.advance_ms(600_000);

    let hit: Option<String> = store.get("/market/van/summary", &[]);
    assert_eq!(hit.as_deref(), Some("fresh"));
  }

  #[test]
  fn test_corrupted_entry_is_a_miss_and_purged() {
    let (store, _clock) = store_with_clock();

    store
      .backend
      .write("propfolio:/market/van/summary", "not json {")
      .unwrap();

    let hit: Option<String> = store.get("/market/van/summary", &[]);
    assert_eq!(hit, None);
    assert!(backend_keys(&store).is_empty());
  }

  #[test]
  fn test_payload_type_mismatch_is_a_miss_and_purged() {
    let (store, _clock) = store_with_clock();

    store.set("/market/van/summary", &[], &"a string", 600_000);
    let hit: Option<u64> = store.get("/market/van/summary", &[]);
    assert_eq!(hit, None);
    assert!(backend_keys(&store).is_empty());
  }

  #[test]
  fn test_delete_removes_exactly_one_key() {
    let (store, _clock) = store_with_clock();

    store.set("/search", &[("q", json!("a"))], &1u8, 600_000);
    store.set("/search", &[("q", json!("b"))], &2u8, 600_000);

    store.delete("/search", &[("q", json!("a"))]);

    assert_eq!(store.get::<u8>("/search", &[("q", json!("a"))]), None);
    assert_eq!(store.get::<u8>("/search", &[("q", json!("b"))]), Some(2));
  }

  #[test]
  fn test_delete_by_pattern_removes_matching_subset() {
    let (store, _clock) = store_with_clock();

    store.set("/search/listings", &[("q", json!("river"))], &1u8, 600_000);
    store.set("/search/listings", &[("q", json!("ocean"))], &2u8, 600_000);
    store.set("/portfolio/properties", &[], &3u8, 600_000);

    // An entry under another namespace sharing the backend.
    store
      .backend
      .write("other:/search/listings?q=river", "untouched")
      .unwrap();

    store.delete_by_pattern("^/search/");

    assert_eq!(store.get::<u8>("/search/listings", &[("q", json!("river"))]), None);
    assert_eq!(store.get::<u8>("/search/listings", &[("q", json!("ocean"))]), None);
    assert_eq!(store.get::<u8>("/portfolio/properties", &[]), Some(3));
    assert_eq!(
      store.backend.read("other:/search/listings?q=river").unwrap(),
      Some("untouched".to_string())
    );
  }

  #[test]
  fn test_invalid_pattern_is_a_noop() {
    let (store, _clock) = store_with_clock();
    store.set("/search", &[], &1u8, 600_000);

    store.delete_by_pattern("([unclosed");

    assert_eq!(store.get::<u8>("/search", &[]), Some(1));
  }

  #[test]
  fn test_clear_all_leaves_other_namespaces() {
    let (store, _clock) = store_with_clock();

    store.set("/search", &[], &1u8, 600_000);
    store.set("/market/van/summary", &[], &2u8, 600_000);
    store.backend.write("other:/search", "untouched").unwrap();

    store.clear_all();

    assert_eq!(store.get::<u8>("/search", &[]), None);
    assert_eq!(store.get::<u8>("/market/van/summary", &[]), None);
    assert_eq!(
      store.backend.read("other:/search").unwrap(),
      Some("untouched".to_string())
    );
  }

  #[test]
  fn test_quota_failure_sweeps_expired_and_retries() {
    let clock = ManualClock::starting_at_epoch();
    // Room for one large entry, not two.
    let store =
      CacheStore::new(MemoryStorage::with_quota(500), "propfolio:").with_clock(clock.clone());

    let payload = "x".repeat(300);
    store.set("/search", &[("q", json!("old"))], &payload, 1_000);

    // First entry expires; the next write must sweep it to fit.
    clock.advance_ms(2_000);
    store.set("/search", &[("q", json!("new"))], &payload, 600_000);

    assert_eq!(store.get::<String>("/search", &[("q", json!("old"))]), None);
    assert_eq!(
      store.get::<String>("/search", &[("q", json!("new"))]),
      Some(payload)
    );
  }

  #[test]
  fn test_quota_failure_with_nothing_to_sweep_is_silent() {
    let clock = ManualClock::starting_at_epoch();
    let store =
      CacheStore::new(MemoryStorage::with_quota(50), "propfolio:").with_clock(clock);

    let payload = "x".repeat(300);
    store.set("/search", &[], &payload, 600_000);

    assert_eq!(store.get::<String>("/search", &[]), None);
  }
}
