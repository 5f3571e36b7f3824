//! Layered request options.
//!
//! Options come from three layers, merged in this order (later wins):
//!
//! 1. [`RequestOptions::defaults`]
//! 2. the `base` options given when the [`Client`](crate::Client) is built
//! 3. the options passed with a single call
//!
//! Every field of [`RequestOptions`] is optional so a layer only overrides
//! what it sets. Leaf values replace; `headers` and `retryRequest` merge key
//! by key. [`RequestOptions::resolve`] turns the merged layers into
//! [`ResolvedOptions`], which is what the pipeline reads.

use std::collections::BTreeMap;
use std::time::Duration;

use dualfetch_core::EnvelopeConfig;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use crate::ClientError;
use crate::transport::BackendHandle;

/// Default option values.
pub mod defaults {
    use std::time::Duration;

    pub const TIMEOUT: Duration = Duration::from_secs(10);
    pub const AUTHENTICATION_SCHEME: &str = "Bearer";
    pub const RETRY_COUNT: u32 = 5;
    pub const RETRY_WAIT: Duration = Duration::from_millis(100);
}

/// How failures are surfaced to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMessageMode {
    /// A blocking dialog.
    Modal,
    /// A transient notification.
    #[default]
    Message,
    /// Nothing; the caller handles the rejection.
    None,
}

/// How successful responses are surfaced to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessMessageMode {
    #[default]
    None,
    /// A transient notification.
    #[serde(alias = "message")]
    Success,
    /// A blocking dialog.
    Modal,
}

/// Body encryption switch, written `0` or `1` on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Encrypt {
    #[default]
    Off,
    On,
}

impl Encrypt {
    pub fn is_on(self) -> bool {
        self == Encrypt::On
    }

    /// The `X-Encrypted` header value.
    pub fn header_value(self) -> HeaderValue {
        match self {
            Encrypt::Off => HeaderValue::from_static("0"),
            Encrypt::On => HeaderValue::from_static("1"),
        }
    }
}

impl TryFrom<u8> for Encrypt {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Encrypt::Off),
            1 => Ok(Encrypt::On),
            other => Err(format!("encrypt must be 0 or 1, got {other}")),
        }
    }
}

impl From<Encrypt> for u8 {
    fn from(value: Encrypt) -> Self {
        match value {
            Encrypt::Off => 0,
            Encrypt::On => 1,
        }
    }
}

impl From<bool> for Encrypt {
    fn from(value: bool) -> Self {
        if value { Encrypt::On } else { Encrypt::Off }
    }
}

/// Partial `retryRequest` settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryRequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Delay between attempts in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,
}

impl RetryRequestOptions {
    fn merge(self, overlay: Self) -> Self {
        Self {
            is_open_retry: overlay.is_open_retry.or(self.is_open_retry),
            count: overlay.count.or(self.count),
            wait_time: overlay.wait_time.or(self.wait_time),
        }
    }
}

/// Resolved retry settings for GET requests.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryRequest {
    pub is_open_retry: bool,
    pub count: u32,
    pub wait_time: Duration,
}

impl RetryRequest {
    /// The retry policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        if self.is_open_retry {
            RetryPolicy::fixed(self.count, self.wait_time)
        } else {
            RetryPolicy::no_retry()
        }
    }
}

/// One layer of request options.
///
/// Deserializes from the camelCase JSON used by front-end request layers:
///
/// ```
/// use dualfetch_client::RequestOptions;
///
/// let options: RequestOptions = serde_json::from_str(r#"{
///     "apiUrl": "http://localhost:3000",
///     "urlPrefix": "/api",
///     "errorMessageMode": "modal",
///     "encrypt": 1,
///     "retryRequest": { "isOpenRetry": true }
/// }"#).unwrap();
/// assert_eq!(options.url_prefix.as_deref(), Some("/api"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestOptions {
    /// Prepend `urlPrefix` to relative URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_prefix: Option<bool>,
    /// Return the raw transport response instead of unwrapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_return_native_response: Option<bool>,
    /// Unwrap the response envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_transform_response: Option<bool>,
    /// Serialize params and body fields onto the URL for non-GET methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_params_to_url: Option<bool>,
    /// Trim strings and normalize timestamps in params and bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message_mode: Option<ErrorMessageMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message_mode: Option<SuccessMessageMode>,
    /// Base URL joined in front of relative URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    /// Append a `_t` cache-busting parameter to GET requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_time: Option<bool>,
    /// When false, a new identical request cancels the one in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_cancel_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<Encrypt>,
    /// Attach the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_request: Option<RetryRequestOptions>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Force a backend for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendHandle>,
}

impl RequestOptions {
    /// An empty layer that overrides nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The hard-coded defaults layer.
    pub fn defaults() -> Self {
        Self {
            join_prefix: Some(true),
            is_return_native_response: Some(false),
            is_transform_response: Some(true),
            join_params_to_url: Some(false),
            format_date: Some(true),
            error_message_mode: Some(ErrorMessageMode::Message),
            success_message_mode: Some(SuccessMessageMode::None),
            api_url: Some(String::new()),
            url_prefix: Some(String::new()),
            join_time: Some(true),
            ignore_cancel_token: Some(true),
            encrypt: Some(Encrypt::Off),
            with_token: Some(true),
            authentication_scheme: Some(defaults::AUTHENTICATION_SCHEME.to_string()),
            retry_request: Some(RetryRequestOptions {
                is_open_retry: Some(false),
                count: Some(defaults::RETRY_COUNT),
                wait_time: Some(defaults::RETRY_WAIT.as_millis() as u64),
            }),
            headers: BTreeMap::new(),
            timeout: Some(defaults::TIMEOUT.as_millis() as u64),
            backend: None,
        }
    }

    /// Merge `overlay` on top of `self`; values set in `overlay` win.
    pub fn merge(self, overlay: RequestOptions) -> RequestOptions {
        let mut headers = self.headers;
        headers.extend(overlay.headers);

        let retry_request = match (self.retry_request, overlay.retry_request) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.or(base),
        };

        RequestOptions {
            join_prefix: overlay.join_prefix.or(self.join_prefix),
            is_return_native_response: overlay
                .is_return_native_response
                .or(self.is_return_native_response),
            is_transform_response: overlay.is_transform_response.or(self.is_transform_response),
            join_params_to_url: overlay.join_params_to_url.or(self.join_params_to_url),
            format_date: overlay.format_date.or(self.format_date),
            error_message_mode: overlay.error_message_mode.or(self.error_message_mode),
            success_message_mode: overlay.success_message_mode.or(self.success_message_mode),
            api_url: overlay.api_url.or(self.api_url),
            url_prefix: overlay.url_prefix.or(self.url_prefix),
            join_time: overlay.join_time.or(self.join_time),
            ignore_cancel_token: overlay.ignore_cancel_token.or(self.ignore_cancel_token),
            encrypt: overlay.encrypt.or(self.encrypt),
            with_token: overlay.with_token.or(self.with_token),
            authentication_scheme: overlay.authentication_scheme.or(self.authentication_scheme),
            retry_request,
            headers,
            timeout: overlay.timeout.or(self.timeout),
            backend: overlay.backend.or(self.backend),
        }
    }

    /// Merge `self` on top of `base`.
    pub fn layered_over(self, base: RequestOptions) -> RequestOptions {
        base.merge(self)
    }

    /// Fill unset values from the defaults and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if a header name or value is invalid.
    pub fn resolve(self) -> Result<ResolvedOptions, ClientError> {
        let merged = Self::defaults().merge(self);

        let mut headers = HeaderMap::with_capacity(merged.headers.len());
        for (name, value) in &merged.headers {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|_| ClientError::config(format!("invalid header name: {name}")))?;
            let header_value = HeaderValue::try_from(value.as_str())
                .map_err(|_| ClientError::config(format!("invalid value for header {name}")))?;
            headers.insert(header_name, header_value);
        }

        let retry = merged.retry_request.unwrap_or_default();

        Ok(ResolvedOptions {
            join_prefix: merged.join_prefix.unwrap_or(true),
            is_return_native_response: merged.is_return_native_response.unwrap_or(false),
            is_transform_response: merged.is_transform_response.unwrap_or(true),
            join_params_to_url: merged.join_params_to_url.unwrap_or(false),
            format_date: merged.format_date.unwrap_or(true),
            error_message_mode: merged.error_message_mode.unwrap_or_default(),
            success_message_mode: merged.success_message_mode.unwrap_or_default(),
            api_url: merged.api_url.unwrap_or_default(),
            url_prefix: merged.url_prefix.unwrap_or_default(),
            join_time: merged.join_time.unwrap_or(true),
            ignore_cancel_token: merged.ignore_cancel_token.unwrap_or(true),
            encrypt: merged.encrypt.unwrap_or_default(),
            with_token: merged.with_token.unwrap_or(true),
            authentication_scheme: merged
                .authentication_scheme
                .unwrap_or_else(|| defaults::AUTHENTICATION_SCHEME.to_string()),
            retry_request: RetryRequest {
                is_open_retry: retry.is_open_retry.unwrap_or(false),
                count: retry.count.unwrap_or(defaults::RETRY_COUNT),
                wait_time: retry
                    .wait_time
                    .map(Duration::from_millis)
                    .unwrap_or(defaults::RETRY_WAIT),
            },
            headers,
            timeout: merged
                .timeout
                .map(Duration::from_millis)
                .unwrap_or(defaults::TIMEOUT),
            backend: merged.backend,
        })
    }

    pub fn join_prefix(mut self, enabled: bool) -> Self {
        self.join_prefix = Some(enabled);
        self
    }

    pub fn is_return_native_response(mut self, enabled: bool) -> Self {
        self.is_return_native_response = Some(enabled);
        self
    }

    pub fn is_transform_response(mut self, enabled: bool) -> Self {
        self.is_transform_response = Some(enabled);
        self
    }

    pub fn join_params_to_url(mut self, enabled: bool) -> Self {
        self.join_params_to_url = Some(enabled);
        self
    }

    pub fn format_date(mut self, enabled: bool) -> Self {
        self.format_date = Some(enabled);
        self
    }

    pub fn error_message_mode(mut self, mode: ErrorMessageMode) -> Self {
        self.error_message_mode = Some(mode);
        self
    }

    pub fn success_message_mode(mut self, mode: SuccessMessageMode) -> Self {
        self.success_message_mode = Some(mode);
        self
    }

    pub fn api_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn url_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.url_prefix = Some(prefix.into());
        self
    }

    pub fn join_time(mut self, enabled: bool) -> Self {
        self.join_time = Some(enabled);
        self
    }

    pub fn ignore_cancel_token(mut self, enabled: bool) -> Self {
        self.ignore_cancel_token = Some(enabled);
        self
    }

    pub fn encrypt(mut self, encrypt: impl Into<Encrypt>) -> Self {
        self.encrypt = Some(encrypt.into());
        self
    }

    pub fn with_token(mut self, enabled: bool) -> Self {
        self.with_token = Some(enabled);
        self
    }

    pub fn authentication_scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.authentication_scheme = Some(scheme.into());
        self
    }

    /// Enable GET retries: `count` attempts, `wait_time` apart.
    pub fn retry_request(mut self, count: u32, wait_time: Duration) -> Self {
        self.retry_request = Some(RetryRequestOptions {
            is_open_retry: Some(true),
            count: Some(count),
            wait_time: Some(wait_time.as_millis() as u64),
        });
        self
    }

    /// Add a default header. Validated by [`resolve`](Self::resolve).
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_millis() as u64);
        self
    }

    /// Force a backend for the call.
    pub fn backend(mut self, backend: BackendHandle) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Fully resolved options for one call.
#[derive(Clone, Debug)]
pub struct ResolvedOptions {
    pub join_prefix: bool,
    pub is_return_native_response: bool,
    pub is_transform_response: bool,
    pub join_params_to_url: bool,
    pub format_date: bool,
    pub error_message_mode: ErrorMessageMode,
    pub success_message_mode: SuccessMessageMode,
    pub api_url: String,
    pub url_prefix: String,
    pub join_time: bool,
    pub ignore_cancel_token: bool,
    pub encrypt: Encrypt,
    pub with_token: bool,
    pub authentication_scheme: String,
    pub retry_request: RetryRequest,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub backend: Option<BackendHandle>,
}

/// Facade construction options, loadable from JSON.
///
/// ```
/// use dualfetch_client::FacadeConfig;
///
/// let config = FacadeConfig::from_json(r#"{
///     "defaultBackend": "fetch",
///     "baseConfig": { "apiUrl": "https://api.example.com", "timeout": 5000 },
///     "envelope": { "successCode": 0 }
/// }"#).unwrap();
/// assert_eq!(config.default_backend.unwrap().as_str(), "fetch");
/// assert_eq!(config.envelope.success_code, 0);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FacadeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<BackendHandle>,
    #[serde(default)]
    pub base_config: RequestOptions,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
}

impl FacadeConfig {
    /// Parse a facade configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json)
            .map_err(|e| ClientError::config(format!("invalid facade config: {e}")))
    }
}
