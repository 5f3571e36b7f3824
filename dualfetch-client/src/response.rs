//! Raw responses and the values handed back to callers.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ClientError;
use crate::descriptor::ResponseType;

/// A response as received from the network, with its body fully buffered.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The URL the request was sent to.
    pub url: String,
}

impl RawResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The response content type, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Decode the body as JSON.
    ///
    /// An empty body decodes to `null`.
    pub fn json(&self) -> Result<Value, ClientError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::malformed(format!("response is not valid JSON: {e}")))
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Coerce the body according to `hint`, without envelope unwrapping.
    pub fn coerce(self, hint: ResponseType) -> Result<Reply, ClientError> {
        match hint {
            ResponseType::Json => self.json().map(Reply::Data),
            ResponseType::Text => Ok(Reply::Text(self.text())),
            ResponseType::Blob => Ok(Reply::Blob(Blob {
                content_type: self.content_type().map(str::to_owned),
                bytes: self.body,
            })),
            ResponseType::Bytes => Ok(Reply::Bytes(self.body)),
        }
    }
}

/// A binary body together with its content type.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The value a call resolves with.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Decoded JSON: the envelope payload, or the whole body when
    /// transformation is disabled.
    Data(Value),
    Text(String),
    Blob(Blob),
    Bytes(Bytes),
    /// The untouched transport response.
    Native(RawResponse),
}

impl Reply {
    /// Borrow the decoded JSON value, if this is [`Reply::Data`].
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Reply::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Take the native response, if this is [`Reply::Native`].
    pub fn into_native(self) -> Option<RawResponse> {
        match self {
            Reply::Native(response) => Some(response),
            _ => None,
        }
    }

    /// Deserialize the reply into `T`.
    ///
    /// Text replies deserialize as a JSON string; binary and native replies
    /// are decoded from their body.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let decoded = match self {
            Reply::Data(value) => serde_json::from_value(value),
            Reply::Text(text) => serde_json::from_value(Value::String(text)),
            Reply::Blob(Blob { bytes, .. }) | Reply::Bytes(bytes) => serde_json::from_slice(&bytes),
            Reply::Native(response) => serde_json::from_slice(&response.body),
        };
        decoded.map_err(|e| ClientError::malformed(format!("unexpected response shape: {e}")))
    }
}
