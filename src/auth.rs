//! Bearer-token credential provider.

use std::sync::{Arc, RwLock};

/// Shared holder for the current bearer token.
///
/// The token is set once (typically right after login) and read by every
/// subsequent request until changed or cleared. There is no automatic
/// expiry; the authentication session lifecycle owns keeping it in sync
/// with login/logout transitions.
#[derive(Clone, Debug, Default)]
pub struct TokenProvider {
  token: Arc<RwLock<Option<String>>>,
}

impl TokenProvider {
  /// Create a provider with no token set.
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a provider pre-seeded with a token.
  pub fn with_token(token: impl Into<String>) -> Self {
    let provider = Self::new();
    provider.set_token(token);
    provider
  }

  /// Replace the current token. All subsequent requests pick it up.
  pub fn set_token(&self, token: impl Into<String>) {
    let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(token.into());
  }

  /// Clear the current token; subsequent requests go out unauthenticated.
  pub fn clear_token(&self) {
    let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
    *guard = None;
  }

  /// The current token, if one is set.
  pub fn token(&self) -> Option<String> {
    let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
    guard.clone()
  }
}
