//! Resilient HTTP request client.
//!
//! Wraps outbound calls to the backend with per-attempt timeout, bounded
//! linear-backoff retry, bearer-token attachment, and classified errors.
//! Retry is an internal concern: callers see either a parsed success value
//! or exactly one [`ApiError`] per logical call.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::ApiError;

/// Per-call request options.
#[derive(Clone, Debug)]
pub struct RequestOptions {
  /// Whether retryable failures may be retried. Defaults to true.
  pub retry: bool,
  /// Extra headers; these override anything the client sets itself.
  pub headers: Vec<(String, String)>,
  /// Per-call timeout override.
  pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      retry: true,
      headers: Vec::new(),
      timeout: None,
    }
  }
}

impl RequestOptions {
  /// Options with retry disabled.
  pub fn no_retry() -> Self {
    Self {
      retry: false,
      ..Self::default()
    }
  }
}

/// HTTP client for the Propfolio backend.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  tokens: TokenProvider,
  timeout: Duration,
  max_retries: u32,
  retry_base_delay: Duration,
}

impl ApiClient {
  /// Create a client from configuration, seeding the token provider from
  /// the environment when a token is set there.
  pub fn new(config: &Config) -> Result<Self> {
    let tokens = match Config::api_token_from_env() {
      Some(token) => TokenProvider::with_token(token),
      None => TokenProvider::new(),
    };
    Self::with_tokens(config, tokens)
  }

  /// Create a client with an externally-owned credential provider.
  pub fn with_tokens(config: &Config, tokens: TokenProvider) -> Result<Self> {
    // A trailing slash makes relative joins resolve under the base path.
    let mut base = config.api.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid base URL {}: {}", config.api.base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      tokens,
      timeout: Duration::from_millis(config.api.timeout_ms),
      max_retries: config.api.max_retries,
      retry_base_delay: Duration::from_millis(config.api.retry_delay_ms),
    })
  }

  /// The credential provider used for bearer-token attachment.
  pub fn tokens(&self) -> &TokenProvider {
    &self.tokens
  }

  /// Perform one logical request against the backend.
  ///
  /// Attempts are strictly sequential. A timeout or transport failure, or a
  /// response with a retryable status, is retried after `base_delay *
  /// attempt` until attempts run out; any other failure is raised
  /// immediately. A successful response without a JSON body yields
  /// `Value::Null`.
  pub async fn execute(
    &self,
    method: Method,
    path: &str,
    query: &[(&str, String)],
    body: Option<&Value>,
    options: &RequestOptions,
  ) -> Result<Value, ApiError> {
    let url = self.request_url(path, query)?;
    let headers = self.request_headers(body.is_some(), options)?;
    let body_bytes = match body {
      Some(value) => Some(
        serde_json::to_vec(value)
          .map_err(|e| ApiError::unknown(format!("Failed to serialize request body: {}", e)))?,
      ),
      None => None,
    };

    let timeout = options.timeout.unwrap_or(self.timeout);
    let max_attempts = if options.retry { 1 + self.max_retries } else { 1 };
    let mut last_error: Option<ApiError> = None;

    for attempt in 1..=max_attempts {
      debug!(method = %method, url = %url, attempt, max_attempts, "Issuing request");

      let mut request = self
        .http
        .request(method.clone(), url.clone())
        .timeout(timeout)
        .headers(headers.clone());
      if let Some(bytes) = &body_bytes {
        request = request.body(bytes.clone());
      }

      let error = match request.send().await {
        Ok(response) => {
          let status = response.status();
          if status.is_success() {
            return Ok(Self::success_value(response).await);
          }
          let text = response.text().await.unwrap_or_default();
          ApiError::from_response(status.as_u16(), &text)
        }
        Err(e) if e.is_timeout() => ApiError::timeout(),
        Err(e) => ApiError::network(e.to_string()),
      };

      if !error.is_retryable() || attempt == max_attempts {
        return Err(error);
      }

      let delay = self.retry_base_delay * attempt;
      warn!(
        method = %method,
        url = %url,
        attempt,
        status = error.status,
        code = %error.code,
        delay_ms = delay.as_millis() as u64,
        "Retrying request"
      );
      last_error = Some(error);
      sleep(delay).await;
    }

    Err(last_error.unwrap_or_else(|| ApiError::unknown("Request failed with no recorded error")))
  }

  /// GET a JSON resource.
  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, ApiError> {
    let value = self
      .execute(Method::GET, path, query, None, &RequestOptions::default())
      .await?;
    Self::decode(value)
  }

  /// POST a JSON body, returning the parsed response.
  pub async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    body: &impl Serialize,
  ) -> Result<T, ApiError> {
    let body = Self::encode(body)?;
    let value = self
      .execute(Method::POST, path, &[], Some(&body), &RequestOptions::default())
      .await?;
    Self::decode(value)
  }

  /// PUT a JSON body, returning the parsed response.
  pub async fn put<T: DeserializeOwned>(
    &self,
    path: &str,
    body: &impl Serialize,
  ) -> Result<T, ApiError> {
    let body = Self::encode(body)?;
    let value = self
      .execute(Method::PUT, path, &[], Some(&body), &RequestOptions::default())
      .await?;
    Self::decode(value)
  }

  /// DELETE a resource, ignoring any response body.
  pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
    self
      .execute(Method::DELETE, path, &[], None, &RequestOptions::default())
      .await?;
    Ok(())
  }

  fn request_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
    let mut url = self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::unknown(format!("Invalid request path {}: {}", path, e)))?;

    if !query.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (name, value) in query {
        pairs.append_pair(name, value);
      }
    }

    Ok(url)
  }

  fn request_headers(&self, has_body: bool, options: &RequestOptions) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();

    if has_body {
      headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    if let Some(token) = self.tokens.token() {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ApiError::unknown(format!("Invalid bearer token: {}", e)))?;
      headers.insert(AUTHORIZATION, value);
    }

    // Caller-supplied headers win over anything set above.
    for (name, value) in &options.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ApiError::unknown(format!("Invalid header name {}: {}", name, e)))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| ApiError::unknown(format!("Invalid header value: {}", e)))?;
      headers.insert(name, value);
    }

    Ok(headers)
  }

  /// Extract the success value from a 2xx response. A missing JSON
  /// content-type or an empty body is an empty success, not an error.
  async fn success_value(response: reqwest::Response) -> Value {
    let is_json = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.contains("application/json"))
      .unwrap_or(false);

    if !is_json {
      return Value::Null;
    }

    let text = response.text().await.unwrap_or_default();
    if text.is_empty() {
      return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::Null)
  }

  fn encode(body: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(body)
      .map_err(|e| ApiError::unknown(format!("Failed to serialize request body: {}", e)))
  }

  fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
      .map_err(|e| ApiError::unknown(format!("Failed to decode response: {}", e)))
  }
}
