//! Storage backends for the cache: a trait plus SQLite and in-memory
//! implementations.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Default quota over stored values, roughly what a browser grants a single
/// origin of local storage.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Failure of a single storage operation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  /// The write would push the store past its size bound.
  #[error("storage quota exceeded")]
  QuotaExceeded,

  #[error("storage backend error: {0}")]
  Backend(String),
}

/// Durable key-value storage with a byte quota over stored values.
///
/// Implementations must be atomic at the single-key level; the cache store
/// above never coordinates concurrent writers beyond that.
pub trait StorageBackend: Send + Sync {
  /// Read the raw value under `key`, if present.
  fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Write `value` under `key`, replacing any existing entry.
  fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Remove the entry under `key`; no-op if absent.
  fn remove(&self, key: &str) -> Result<(), StorageError>;

  /// All stored keys starting with `prefix`.
  fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
  StorageError::Backend(e.to_string())
}

/// SQLite-backed storage at a local path.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  max_bytes: u64,
}

/// Schema for the key-value cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open(max_bytes: u64) -> Result<Self> {
    Self::open_at(&Self::default_path()?, max_bytes)
  }

  /// Open the storage at an explicit path with an explicit quota.
  pub fn open_at(path: &Path, max_bytes: u64) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      max_bytes,
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("propfolio").join("cache.db"))
  }
}

impl StorageBackend for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
    let conn = self.conn.lock().map_err(backend_err)?;

    let mut stmt = conn
      .prepare("SELECT value FROM kv_cache WHERE key = ?")
      .map_err(backend_err)?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(backend_err)?;

    // Size the store as it would be after the write: everything except the
    // key being replaced, plus the new value.
    let other_bytes: u64 = conn
      .query_row(
        "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv_cache WHERE key != ?",
        params![key],
        |row| row.get::<_, i64>(0),
      )
      .map_err(backend_err)? as u64;

    if other_bytes + value.len() as u64 > self.max_bytes {
      return Err(StorageError::QuotaExceeded);
    }

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key, value, written_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(backend_err)?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(backend_err)?;

    conn
      .execute("DELETE FROM kv_cache WHERE key = ?", params![key])
      .map_err(backend_err)?;

    Ok(())
  }

  fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    let conn = self.conn.lock().map_err(backend_err)?;

    let mut stmt = conn
      .prepare("SELECT key FROM kv_cache WHERE key LIKE ?")
      .map_err(backend_err)?;

    let keys: Vec<String> = stmt
      .query_map(params![format!("{}%", prefix)], |row| row.get(0))
      .map_err(backend_err)?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

/// In-memory storage with the same quota semantics, for tests and
/// ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
  max_bytes: Option<u64>,
}

impl MemoryStorage {
  /// Unbounded in-memory storage.
  pub fn new() -> Self {
    Self::default()
  }

  /// In-memory storage enforcing a byte quota over stored values.
  pub fn with_quota(max_bytes: u64) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      max_bytes: Some(max_bytes),
    }
  }
}

impl StorageBackend for MemoryStorage {
  fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
    let entries = self.entries.lock().map_err(backend_err)?;
    Ok(entries.get(key).cloned())
  }

  fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let mut entries = self.entries.lock().map_err(backend_err)?;

    if let Some(max_bytes) = self.max_bytes {
      let other_bytes: u64 = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(_, v)| v.len() as u64)
        .sum();
      if other_bytes + value.len() as u64 > max_bytes {
        return Err(StorageError::QuotaExceeded);
      }
    }

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let mut entries = self.entries.lock().map_err(backend_err)?;
    entries.remove(key);
    Ok(())
  }

  fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    let entries = self.entries.lock().map_err(backend_err)?;
    Ok(
      entries
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }
}
