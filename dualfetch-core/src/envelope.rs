//! The `{code, message, data}` response envelope.
//!
//! Every business response is wrapped on the wire as:
//!
//! ```text
//! { "code": 200, "message": "ok", "data": <payload> }
//! ```
//!
//! A response is successful iff `code` equals the configured success code.
//! The expired-authentication code is reserved and handled separately from
//! ordinary application failures.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;

/// Well-known envelope codes.
pub mod result_code {
    /// Default success code.
    pub const SUCCESS: i64 = 200;
    /// Default code signalling an expired authentication token.
    pub const AUTH_EXPIRED: i64 = 401;
}

/// A business response envelope.
///
/// `data` also accepts the legacy field name `result` when decoding.
/// A missing `data` decodes to `T::default()` (JSON `null` for [`Value`]),
/// a missing or `null` `message` decodes to an empty string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct ResponseEnvelope<T = Value> {
    pub code: i64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub message: String,
    #[serde(default, alias = "result")]
    pub data: T,
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl<T> ResponseEnvelope<T> {
    /// Create an envelope with an explicit code and message.
    pub fn new<S: Into<String>>(code: i64, message: S, data: T) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Consume the envelope, returning `data` on success or the matching error.
    pub fn into_result(self, config: &EnvelopeConfig) -> Result<T, EnvelopeError> {
        match config.classify(self.code) {
            EnvelopeStatus::Success => Ok(self.data),
            EnvelopeStatus::AuthExpired => Err(EnvelopeError::AuthExpired {
                message: self.message,
            }),
            EnvelopeStatus::Failure => Err(EnvelopeError::Application {
                code: self.code,
                message: self.message,
            }),
        }
    }
}

impl<T: Default> ResponseEnvelope<T> {
    /// Create a failure envelope without a payload.
    pub fn failure<S: Into<String>>(code: i64, message: S) -> Self {
        Self::new(code, message, T::default())
    }
}

impl ResponseEnvelope<Value> {
    /// Decode an envelope from an already-parsed JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if the body is not an object with
    /// an integer `code` field.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        if peek_code(&value).is_none() {
            return Err(EnvelopeError::Malformed(
                "expected an object with an integer `code` field".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

/// Wrap `data` in a success envelope using [`result_code::SUCCESS`].
pub fn wrap<T>(data: T) -> ResponseEnvelope<T> {
    ResponseEnvelope::new(result_code::SUCCESS, "ok", data)
}

/// Unwrap a JSON envelope into its payload.
///
/// # Example
///
/// ```
/// use dualfetch_core::{EnvelopeConfig, unwrap_value, wrap};
/// use serde_json::json;
///
/// let body = serde_json::to_value(wrap(json!({"id": 7}))).unwrap();
/// let data = unwrap_value(body, &EnvelopeConfig::default()).unwrap();
/// assert_eq!(data, json!({"id": 7}));
/// ```
pub fn unwrap_value(value: Value, config: &EnvelopeConfig) -> Result<Value, EnvelopeError> {
    ResponseEnvelope::from_value(value)?.into_result(config)
}

/// Read the envelope `code` without decoding the rest of the body.
pub fn peek_code(value: &Value) -> Option<i64> {
    value.as_object()?.get("code")?.as_i64()
}

/// Classification of an envelope code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeStatus {
    Success,
    AuthExpired,
    Failure,
}

/// Which envelope codes mean success and expired authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeConfig {
    pub success_code: i64,
    pub auth_expired_code: i64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            success_code: result_code::SUCCESS,
            auth_expired_code: result_code::AUTH_EXPIRED,
        }
    }
}

impl EnvelopeConfig {
    /// Create a config with the default codes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the success code.
    pub fn success_code(mut self, code: i64) -> Self {
        self.success_code = code;
        self
    }

    /// Set the expired-authentication code.
    pub fn auth_expired_code(mut self, code: i64) -> Self {
        self.auth_expired_code = code;
        self
    }

    /// Classify an envelope code.
    pub fn classify(&self, code: i64) -> EnvelopeStatus {
        if code == self.success_code {
            EnvelopeStatus::Success
        } else if code == self.auth_expired_code {
            EnvelopeStatus::AuthExpired
        } else {
            EnvelopeStatus::Failure
        }
    }
}
