//! Tokens, token storage and token refresh strategies.
//!
//! - [`TokenStore`]: Where the current access and refresh tokens live
//! - [`TokenRefresher`]: How a new access token is obtained
//! - [`EndpointRefresher`]: A refresher that calls a refresh endpoint
//! - [`BodyEncryptor`]: Request body encryption

mod encrypt;

use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use dualfetch_core::{EnvelopeConfig, unwrap_value};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use encrypt::{AesGcmEncryptor, BodyEncryptor, EncryptedBody};

use crate::ClientError;
use crate::notify::status_message;
use crate::transport::map_reqwest_error;

/// An access token and, optionally, the token used to refresh it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token<S: Into<String>>(mut self, refresh_token: S) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Storage for the current tokens.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    /// Replace the tokens. A pair without a refresh token keeps the stored one.
    fn set_tokens(&self, tokens: TokenPair);

    fn clear(&self);
}

/// In-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<StoredTokens>,
}

#[derive(Debug, Default)]
struct StoredTokens {
    access: Option<String>,
    refresh: Option<String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `tokens`.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        let store = Self::new();
        store.set_tokens(tokens);
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access
            .clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh
            .clone()
    }

    fn set_tokens(&self, tokens: TokenPair) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.access = Some(tokens.access_token);
        if let Some(refresh) = tokens.refresh_token {
            inner.refresh = Some(refresh);
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.access = None;
        inner.refresh = None;
    }
}

/// Obtains a new token pair.
///
/// Called by the refresh coordinator at most once per refresh cycle, with the
/// currently stored refresh token.
pub trait TokenRefresher: Send + Sync {
    fn refresh(
        &self,
        refresh_token: Option<String>,
    ) -> BoxFuture<'_, Result<TokenPair, ClientError>>;
}

/// A [`TokenRefresher`] backed by a closure.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::{RefreshFn, TokenPair};
///
/// let refresher = RefreshFn::new(|_refresh_token| async move {
///     Ok(TokenPair::new("fresh"))
/// });
/// ```
pub struct RefreshFn<F> {
    f: F,
}

impl<F> RefreshFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> TokenRefresher for RefreshFn<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TokenPair, ClientError>> + Send + 'static,
{
    fn refresh(
        &self,
        refresh_token: Option<String>,
    ) -> BoxFuture<'_, Result<TokenPair, ClientError>> {
        Box::pin((self.f)(refresh_token))
    }
}

/// Refreshes tokens by POSTing `{"refreshToken": ...}` to an endpoint.
///
/// The endpoint must answer with an envelope whose data is
/// `{"accessToken": ..., "refreshToken": ...}`. The call bypasses the
/// transform pipeline.
#[derive(Clone, Debug)]
pub struct EndpointRefresher {
    client: reqwest::Client,
    url: String,
    envelope: EnvelopeConfig,
    timeout: Duration,
}

impl EndpointRefresher {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            envelope: EnvelopeConfig::default(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Use an existing reqwest client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, refresh_token: Option<String>) -> Result<TokenPair, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;
        if !status.is_success() {
            return Err(ClientError::http_status(status, status_message(status)));
        }

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| ClientError::malformed(format!("refresh response is not JSON: {e}")))?;
        let data = unwrap_value(value, &self.envelope)?;
        serde_json::from_value(data)
            .map_err(|e| ClientError::malformed(format!("unexpected refresh payload: {e}")))
    }
}

impl TokenRefresher for EndpointRefresher {
    fn refresh(
        &self,
        refresh_token: Option<String>,
    ) -> BoxFuture<'_, Result<TokenPair, ClientError>> {
        Box::pin(self.call(refresh_token))
    }
}
