//! Request bodies and the raw request handed to a backend.

use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::Full;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ClientError;

/// Request body payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON value, sent as `application/json`.
    Json(Value),
    /// A text body, sent as `text/plain`.
    Text(String),
    /// Raw bytes, sent as `application/octet-stream`.
    Bytes(Bytes),
}

impl RequestBody {
    /// Returns true if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// The content type implied by this body, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Text(_) => Some("text/plain; charset=utf-8"),
            RequestBody::Bytes(_) => Some("application/octet-stream"),
        }
    }

    /// Encode the body to bytes.
    pub fn to_bytes(&self) -> Result<Bytes, ClientError> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| ClientError::encode(format!("failed to encode JSON body: {e}"))),
            RequestBody::Text(text) => Ok(Bytes::from(text.clone())),
            RequestBody::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

/// A fully prepared request, ready for network I/O.
///
/// Produced by the pipeline from a [`RequestDescriptor`](crate::RequestDescriptor)
/// after `before_request`, then handed to the request interceptor and finally
/// to a backend.
#[derive(Clone, Debug)]
pub struct RawRequest {
    pub method: Method,
    /// Final URL including the query string.
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
    /// Key used to supersede an identical in-flight request, when enabled.
    pub dedupe_key: Option<String>,
}

impl RawRequest {
    /// Headers with the body's content type filled in when absent.
    pub fn effective_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if !headers.contains_key(CONTENT_TYPE) {
            if let Some(content_type) = self.body.content_type() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        headers
    }

    /// Convert into an `http::Request` with a buffered body.
    pub fn into_http(self) -> Result<http::Request<Full<Bytes>>, ClientError> {
        let headers = self.effective_headers();
        let body = self.body.to_bytes()?;
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(self.url.as_str())
            .body(Full::new(body))
            .map_err(|e| ClientError::config(format!("invalid request: {e}")))?;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(body: RequestBody) -> RawRequest {
        RawRequest {
            method: Method::POST,
            url: "http://localhost/a?b=1".into(),
            headers: HeaderMap::new(),
            body,
            timeout: Duration::from_secs(1),
            cancel: None,
            dedupe_key: None,
        }
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let req = raw(RequestBody::Json(json!({"a": 1})));
        let headers = req.effective_headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(req.body.to_bytes().unwrap(), Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let mut req = raw(RequestBody::Text("x".into()));
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/x-custom"));
        assert_eq!(req.effective_headers()[CONTENT_TYPE], "application/x-custom");
    }

    #[test]
    fn test_empty_body_has_no_content_type() {
        let req = raw(RequestBody::Empty);
        assert!(!req.effective_headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_into_http() {
        let req = raw(RequestBody::Text("hello".into())).into_http().unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/a");
        assert_eq!(req.uri().query(), Some("b=1"));
        assert_eq!(req.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_into_http_invalid_url() {
        let mut req = raw(RequestBody::Empty);
        req.url = "http://bad host/".into();
        assert!(req.into_http().is_err());
    }
}
