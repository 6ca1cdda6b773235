//! Authentication provider trait and an in-memory implementation.
//!
//! Implement [`AuthProvider`] to plug the realtime client into whatever owns
//! the session: an OAuth flow, a token cache on disk, a kiosk provisioning
//! service. The client reads it before every connect attempt.
//!
//! ```rust,no_run
//! use place_link::{AuthProvider, Authority};
//!
//! struct KioskAuth { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl AuthProvider for KioskAuth {
//!     fn current_token(&self) -> Option<String> { Some("token".into()) }
//!     fn authority(&self) -> Option<Authority> { None }
//!     fn host(&self) -> String { "placeos.local".into() }
//!     fn invalidate_token(&self) {}
//!     async fn refresh_authority(&self) -> place_link::Result<()> { Ok(()) }
//! }
//! ```

use crate::error::{PlaceLinkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};

/// Token value signalling that the API key should be used instead.
pub const API_KEY_TOKEN: &str = "x-api-key";

/// Default HTTP route of the engine API.
const DEFAULT_HTTP_ROUTE: &str = "/api/engine/v2";

/// Authority descriptor of a PlaceOS domain.
///
/// Only its presence gates connecting; the fields are carried for callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub logout_url: String,
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub session: bool,
    #[serde(default)]
    pub config: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Authority {
    /// Authority used by the mock backend.
    pub fn mock() -> Self {
        Self {
            id: "mock-authority".to_string(),
            name: "localhost:4200".to_string(),
            domain: "localhost:4200".to_string(),
            login_url: "/login?continue={{url}}".to_string(),
            logout_url: "/logout".to_string(),
            session: true,
            version: Some("2.0.0".to_string()),
            ..Default::default()
        }
    }
}

/// Source of credentials and endpoint details for the realtime socket.
///
/// Only [`current_token`](Self::current_token), [`authority`](Self::authority),
/// [`host`](Self::host), [`invalidate_token`](Self::invalidate_token) and
/// [`refresh_authority`](Self::refresh_authority) are required.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Current access token, if one is held.
    fn current_token(&self) -> Option<String>;

    /// Whether the token is the API key sentinel.
    fn token_is_api_key(&self) -> bool {
        self.current_token().as_deref() == Some(API_KEY_TOKEN)
    }

    /// API key used when [`token_is_api_key`](Self::token_is_api_key) is true.
    fn api_key(&self) -> Option<String> {
        None
    }

    /// Loaded authority descriptor.
    fn authority(&self) -> Option<Authority>;

    /// Serve every request from the in-process mock backend.
    fn is_mock(&self) -> bool {
        false
    }

    /// Use `wss://` instead of `ws://`.
    fn is_secure(&self) -> bool {
        false
    }

    /// Host (and port) of the engine.
    fn host(&self) -> String;

    /// HTTP route of the engine API, e.g. `/api/engine/v2`.
    fn http_route(&self) -> String {
        DEFAULT_HTTP_ROUTE.to_string()
    }

    /// Send the token in the URL query instead of a cookie.
    fn needs_token_header(&self) -> bool {
        false
    }

    /// This client is a fixed device (kiosk, panel).
    fn is_fixed_device(&self) -> bool {
        false
    }

    /// Forget the current token. Called after a 401 from the socket upgrade.
    fn invalidate_token(&self);

    /// Reload the authority descriptor. Called after every socket error.
    async fn refresh_authority(&self) -> Result<()>;
}

/// A shared, dynamically dispatched [`AuthProvider`].
pub type ArcAuthProvider = Arc<dyn AuthProvider>;

#[derive(Debug, Clone)]
struct StaticAuthState {
    token: Option<String>,
    api_key: Option<String>,
    authority: Option<Authority>,
    host: String,
    http_route: String,
    secure: bool,
    mock: bool,
    fixed_device: bool,
    token_header: bool,
    refreshes: u32,
}

/// In-memory [`AuthProvider`] for tools, tests and simple deployments.
///
/// Credentials can be swapped at runtime with [`set_token`](Self::set_token)
/// and [`set_authority`](Self::set_authority); a running client picks them up
/// on its next connect attempt.
///
/// # Examples
///
/// ```rust
/// use place_link::{Authority, StaticAuthProvider};
///
/// let auth = StaticAuthProvider::new("placeos.example.com")
///     .with_secure(true)
///     .with_token("eyJhbGc...")
///     .with_authority(Authority::default());
///
/// // Everything served in-process
/// let mock = StaticAuthProvider::mock();
/// ```
#[derive(Debug)]
pub struct StaticAuthProvider {
    state: Mutex<StaticAuthState>,
}

impl StaticAuthProvider {
    /// Provider for `host` with no token and no authority loaded.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(StaticAuthState {
                token: None,
                api_key: None,
                authority: None,
                host: host.into(),
                http_route: DEFAULT_HTTP_ROUTE.to_string(),
                secure: false,
                mock: false,
                fixed_device: false,
                token_header: false,
                refreshes: 0,
            }),
        }
    }

    /// Provider for the in-process mock backend.
    pub fn mock() -> Self {
        Self::new("localhost:4200")
            .with_mock(true)
            .with_token("mock-token")
            .with_authority(Authority::mock())
    }

    fn lock(&self) -> MutexGuard<'_, StaticAuthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Authenticate with an API key (the token becomes the API key sentinel).
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            state.api_key = Some(key.into());
            state.token = Some(API_KEY_TOKEN.to_string());
        }
        self
    }

    pub fn with_authority(self, authority: Authority) -> Self {
        self.set_authority(Some(authority));
        self
    }

    pub fn with_http_route(self, route: impl Into<String>) -> Self {
        self.lock().http_route = route.into();
        self
    }

    pub fn with_secure(self, secure: bool) -> Self {
        self.lock().secure = secure;
        self
    }

    pub fn with_mock(self, mock: bool) -> Self {
        self.lock().mock = mock;
        self
    }

    pub fn with_fixed_device(self, fixed: bool) -> Self {
        self.lock().fixed_device = fixed;
        self
    }

    pub fn with_token_header(self, token_header: bool) -> Self {
        self.lock().token_header = token_header;
        self
    }

    /// Replace the token.
    pub fn set_token(&self, token: Option<String>) {
        self.lock().token = token;
    }

    /// Replace the authority descriptor.
    pub fn set_authority(&self, authority: Option<Authority>) {
        self.lock().authority = authority;
    }

    /// Number of times [`refresh_authority`](AuthProvider::refresh_authority)
    /// has been called.
    pub fn refresh_count(&self) -> u32 {
        self.lock().refreshes
    }
}

#[async_trait::async_trait]
impl AuthProvider for StaticAuthProvider {
    fn current_token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    fn api_key(&self) -> Option<String> {
        self.lock().api_key.clone()
    }

    fn authority(&self) -> Option<Authority> {
        self.lock().authority.clone()
    }

    fn is_mock(&self) -> bool {
        self.lock().mock
    }

    fn is_secure(&self) -> bool {
        self.lock().secure
    }

    fn host(&self) -> String {
        self.lock().host.clone()
    }

    fn http_route(&self) -> String {
        self.lock().http_route.clone()
    }

    fn needs_token_header(&self) -> bool {
        self.lock().token_header
    }

    fn is_fixed_device(&self) -> bool {
        self.lock().fixed_device
    }

    fn invalidate_token(&self) {
        log::debug!("[place-link] Invalidating access token");
        self.lock().token = None;
    }

    async fn refresh_authority(&self) -> Result<()> {
        let mut state = self.lock();
        state.refreshes += 1;
        match state.authority {
            Some(_) => Ok(()),
            None => Err(PlaceLinkError::AuthorityNotLoaded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_provider_has_no_credentials() {
        let auth = StaticAuthProvider::new("placeos.local");
        assert_eq!(auth.current_token(), None);
        assert_eq!(auth.authority(), None);
        assert_eq!(auth.host(), "placeos.local");
        assert_eq!(auth.http_route(), "/api/engine/v2");
        assert!(!auth.is_mock());
    }

    #[test]
    fn test_api_key_sets_sentinel_token() {
        let auth = StaticAuthProvider::new("placeos.local").with_api_key("key-123");
        assert!(auth.token_is_api_key());
        assert_eq!(auth.api_key().as_deref(), Some("key-123"));
    }

    #[test]
    fn test_invalidate_token() {
        let auth = StaticAuthProvider::new("placeos.local").with_token("abc");
        assert_eq!(auth.current_token().as_deref(), Some("abc"));
        auth.invalidate_token();
        assert_eq!(auth.current_token(), None);
    }

    #[test]
    fn test_mock_provider() {
        let auth = StaticAuthProvider::mock();
        assert!(auth.is_mock());
        assert!(auth.current_token().is_some());
        assert_eq!(auth.authority().map(|a| a.id), Some("mock-authority".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_authority_is_counted() {
        let auth = StaticAuthProvider::new("placeos.local").with_authority(Authority::default());
        auth.refresh_authority().await.unwrap();
        auth.refresh_authority().await.unwrap();
        assert_eq!(auth.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_authority_fails() {
        let auth = StaticAuthProvider::new("placeos.local");
        assert_eq!(
            auth.refresh_authority().await,
            Err(PlaceLinkError::AuthorityNotLoaded)
        );
        assert_eq!(auth.refresh_count(), 1);

        auth.set_authority(Some(Authority::default()));
        assert_eq!(auth.refresh_authority().await, Ok(()));
    }

    #[test]
    fn test_authority_deserializes_with_defaults() {
        let authority: Authority =
            serde_json::from_str(r#"{"id":"auth-1","domain":"site.example"}"#).unwrap();
        assert_eq!(authority.id, "auth-1");
        assert_eq!(authority.domain, "site.example");
        assert_eq!(authority.version, None);
    }
}
