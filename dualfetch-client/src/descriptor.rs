//! Per-call request descriptors.
//!
//! A [`RequestDescriptor`] is the normalized description of one outbound
//! call before transport. Callers build one and hand it to the
//! [`Client`](crate::Client); the pipeline only ever works on clones, so the
//! caller's value is never mutated.

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::ClientError;
use crate::request::RequestBody;

/// How the response body should be coerced before it reaches the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Decode JSON and unwrap the response envelope.
    #[default]
    Json,
    /// Return the body as UTF-8 text.
    Text,
    /// Return the body together with its content type.
    Blob,
    /// Return the raw body bytes.
    Bytes,
}

/// Description of one outbound call.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::RequestDescriptor;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let descriptor = RequestDescriptor::new("/users")
///     .param("page", 1)
///     .json(&json!({"name": "ann"}))?
///     .timeout(Duration::from_secs(3));
/// ```
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    /// Target URL, absolute or relative to the configured API base.
    pub url: String,
    /// HTTP method. Defaults to GET.
    pub method: Method,
    /// Request headers. Keys are case-insensitive and unique.
    pub headers: HeaderMap,
    /// Query parameters.
    pub params: Map<String, Value>,
    /// Request body.
    pub body: RequestBody,
    /// Timeout for this call, overriding the configured one.
    pub timeout: Option<Duration>,
    /// Response coercion hint.
    pub response_type: ResponseType,
    /// Caller-owned cancellation token.
    pub cancel: Option<CancellationToken>,
    /// Arbitrary per-call values for custom hooks.
    pub extensions: Map<String, Value>,
    retried: bool,
}

impl RequestDescriptor {
    /// Create a GET descriptor for `url`.
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            params: Map::new(),
            body: RequestBody::Empty,
            timeout: None,
            response_type: ResponseType::Json,
            cancel: None,
            extensions: Map::new(),
            retried: false,
        }
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Try to add a header from strings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Result<Self, ClientError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name
            .try_into()
            .map_err(|_| ClientError::config("invalid header name"))?;
        let value = value
            .try_into()
            .map_err(|_| ClientError::config(format!("invalid value for header {name}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add a query parameter.
    pub fn param<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace all query parameters.
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Set the body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Set a JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns a transport error with reason `Encode` if `value` cannot be
    /// represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(value).map_err(|e| ClientError::encode(e.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Set the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the response coercion hint.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancelling it fails the call with an abort-kind transport error.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach an arbitrary per-call value.
    pub fn extension<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Whether this descriptor has already been replayed after a token refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Derive the replay copy used after a token refresh.
    pub(crate) fn mark_retried(&self) -> Self {
        let mut replay = self.clone();
        replay.retried = true;
        replay
    }
}
