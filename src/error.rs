//! Classified API errors.
//!
//! Every failure surfaced by the request client is an [`ApiError`] carrying a
//! human-readable message, the HTTP status (0 for transport-level failures),
//! and a machine-readable [`ErrorCode`] so callers can branch on failure kind
//! without string matching.

use serde_json::Value;

/// HTTP status codes for which a repeated attempt is likely to succeed.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Machine-readable failure category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
  /// An attempt did not complete within its allotted window.
  Timeout,
  /// The request never reached the server (DNS, connection refused).
  NetworkError,
  /// A non-success HTTP status with no more specific server code.
  HttpError,
  /// An exception that matched none of the known categories.
  UnknownError,
  /// A code supplied by the server's error body, passed through verbatim.
  Api(String),
}

impl ErrorCode {
  pub fn as_str(&self) -> &str {
    match self {
      ErrorCode::Timeout => "TIMEOUT",
      ErrorCode::NetworkError => "NETWORK_ERROR",
      ErrorCode::HttpError => "HTTP_ERROR",
      ErrorCode::UnknownError => "UNKNOWN_ERROR",
      ErrorCode::Api(code) => code,
    }
  }
}

impl std::fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A classified request failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  /// Human-readable description, derived from the server's error body when
  /// one was available.
  pub message: String,
  /// HTTP status of the failed response, or 0 for transport failures.
  pub status: u16,
  /// Failure category.
  pub code: ErrorCode,
  /// Raw error payload for diagnostics, when the body parsed as JSON.
  pub details: Option<Value>,
}

impl ApiError {
  /// An attempt was aborted by its timeout clock.
  pub fn timeout() -> Self {
    Self {
      message: "Request timed out".to_string(),
      status: 408,
      code: ErrorCode::Timeout,
      details: None,
    }
  }

  /// The request never reached the server.
  pub fn network(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: 0,
      code: ErrorCode::NetworkError,
      details: None,
    }
  }

  /// A failure that matched none of the known categories.
  pub fn unknown(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: 0,
      code: ErrorCode::UnknownError,
      details: None,
    }
  }

  /// Classify a non-success HTTP response from its status and raw body.
  pub fn from_response(status: u16, body: &str) -> Self {
    let (message, code, details) = parse_error_body(status, body);
    Self {
      message,
      status,
      code,
      details,
    }
  }

  /// True for transport-level failures that never produced an HTTP status.
  pub fn is_network_error(&self) -> bool {
    self.status == 0
  }

  /// True for 401/403 responses; the UI boundary uses this to prompt
  /// re-authentication.
  pub fn is_auth_error(&self) -> bool {
    self.status == 401 || self.status == 403
  }

  pub fn is_server_error(&self) -> bool {
    self.status >= 500
  }

  /// Whether the retry policy may repeat the attempt that produced this
  /// error. Transport failures and timeouts always qualify.
  pub fn is_retryable(&self) -> bool {
    matches!(self.code, ErrorCode::Timeout | ErrorCode::NetworkError)
      || RETRYABLE_STATUSES.contains(&self.status)
  }
}

/// Derive (message, code, details) from a raw error response body.
///
/// The backend's error shape is loose: a JSON body may carry `message`,
/// `code`, and/or `detail`, where `detail` is itself a string, an object with
/// `message`/`code`, or an array of structured validation errors. Each known
/// shape is tried in order; a non-JSON body falls back to its trimmed text,
/// then to a generic message.
fn parse_error_body(status: u16, body: &str) -> (String, ErrorCode, Option<Value>) {
  let fallback = format!("Request failed with status {}", status);

  let parsed: Option<Value> = serde_json::from_str(body).ok();
  let Some(value) = parsed else {
    let text = body.trim();
    let message = if text.is_empty() {
      fallback
    } else {
      text.to_string()
    };
    return (message, ErrorCode::HttpError, None);
  };

  let mut message = value
    .get("message")
    .and_then(Value::as_str)
    .map(str::to_string);
  let mut code = value
    .get("code")
    .and_then(Value::as_str)
    .map(|c| ErrorCode::Api(c.to_string()));

  if let Some(detail) = value.get("detail") {
    let (detail_message, detail_code) = flatten_detail(detail);
    if message.is_none() {
      message = detail_message;
    }
    if code.is_none() {
      code = detail_code.map(ErrorCode::Api);
    }
  }

  (
    message.unwrap_or(fallback),
    code.unwrap_or(ErrorCode::HttpError),
    Some(value),
  )
}

/// Flatten the `detail` field of an error body into a message and an
/// optional server code.
fn flatten_detail(detail: &Value) -> (Option<String>, Option<String>) {
  match detail {
    Value::String(s) => (Some(s.clone()), None),
    Value::Object(obj) => {
      let message = obj.get("message").and_then(Value::as_str).map(str::to_string);
      let code = obj.get("code").and_then(Value::as_str).map(str::to_string);
      (message, code)
    }
    Value::Array(items) => {
      let parts: Vec<String> = items.iter().filter_map(flatten_validation_item).collect();
      if parts.is_empty() {
        (None, None)
      } else {
        (Some(parts.join("; ")), None)
      }
    }
    _ => (None, None),
  }
}

/// Render one structured validation error as a readable string.
fn flatten_validation_item(item: &Value) -> Option<String> {
  match item {
    Value::String(s) => Some(s.clone()),
    Value::Object(obj) => {
      let msg = obj.get("msg").or_else(|| obj.get("message"))?.as_str()?;
      let field = obj.get("loc").and_then(Value::as_array).map(|loc| {
        loc
          .iter()
          .map(|part| match part {
            Value::String(s) => s.clone(),
            other => other.to_string(),
          })
          .collect::<Vec<_>>()
          .join(".")
      });
      match field {
        Some(field) if !field.is_empty() => Some(format!("{}: {}", field, msg)),
        _ => Some(msg.to_string()),
      }
    }
    _ => None,
  }
}
