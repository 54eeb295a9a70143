use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the Propfolio backend, e.g. "https://api.propfolio.io/v1".
  pub base_url: String,
  /// Per-attempt timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Retry attempts beyond the first, for retryable failures.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base retry delay in milliseconds; the wait before attempt N+1 is
  /// `retry_delay_ms * N`.
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Whether accessors consult the local response cache at all.
  #[serde(default = "default_cache_enabled")]
  pub enabled: bool,
  /// Directory for the cache database (defaults to the platform data dir).
  pub dir: Option<PathBuf>,
  /// Key prefix separating this application's entries from anything else
  /// sharing the storage.
  #[serde(default = "default_namespace")]
  pub namespace: String,
  /// Quota over stored values, in bytes.
  #[serde(default = "default_max_bytes")]
  pub max_bytes: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: default_cache_enabled(),
      dir: None,
      namespace: default_namespace(),
      max_bytes: default_max_bytes(),
    }
  }
}

fn default_timeout_ms() -> u64 {
  30_000
}

fn default_max_retries() -> u32 {
  2
}

fn default_retry_delay_ms() -> u64 {
  1_000
}

fn default_cache_enabled() -> bool {
  true
}

fn default_namespace() -> String {
  "propfolio:".to_string()
}

fn default_max_bytes() -> u64 {
  crate::cache::DEFAULT_QUOTA_BYTES
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./propfolio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/propfolio/config.yaml
  /// 4. ~/.config/propfolio/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/propfolio/config.yaml"
      )),
    }
  }

  /// A config with the given base URL and default settings everywhere else.
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        base_url: base_url.into(),
        timeout_ms: default_timeout_ms(),
        max_retries: default_max_retries(),
        retry_delay_ms: default_retry_delay_ms(),
      },
      cache: CacheConfig::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("propfolio.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("propfolio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The API token from the environment, if one is set.
  ///
  /// Checks PROPFOLIO_API_TOKEN first, then PROPFOLIO_TOKEN as fallback.
  pub fn api_token_from_env() -> Option<String> {
    std::env::var("PROPFOLIO_API_TOKEN")
      .or_else(|_| std::env::var("PROPFOLIO_TOKEN"))
      .ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_yaml_uses_defaults() {
    let config: Config = serde_yaml::from_str(
      r#"
api:
  base_url: "https://api.propfolio.io/v1"
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://api.propfolio.io/v1");
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.api.max_retries, 2);
    assert_eq!(config.api.retry_delay_ms, 1_000);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.namespace, "propfolio:");
  }

  #[test]
  fn test_full_yaml_overrides() {
    let config: Config = serde_yaml::from_str(
      r#"
api:
  base_url: "http://localhost:8080"
  timeout_ms: 5000
  max_retries: 1
  retry_delay_ms: 250
cache:
  enabled: false
  namespace: "test:"
  max_bytes: 1024
"#,
    )
    .unwrap();

    assert_eq!(config.api.timeout_ms, 5_000);
    assert_eq!(config.api.max_retries, 1);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.namespace, "test:");
    assert_eq!(config.cache.max_bytes, 1_024);
  }
}
