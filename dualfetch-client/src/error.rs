//! Client-side error types.
//!
//! This module provides [`ClientError`], the single error type returned by
//! every call made through the facade, whichever backend served it.

use std::time::Duration;

use dualfetch_core::{EnvelopeError, FailureKind};
use http::StatusCode;

/// Why a transport-kind failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportReason {
    /// Connection could not be established or was reset.
    Connect,
    /// The call was cancelled by the caller or superseded by a newer call.
    Aborted,
    /// The response body could not be read.
    Body,
    /// The response body did not have the expected shape.
    Malformed,
    /// The request could not be encoded (serialization or encryption).
    Encode,
}

impl TransportReason {
    /// Get the string representation of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportReason::Connect => "connect",
            TransportReason::Aborted => "aborted",
            TransportReason::Body => "body",
            TransportReason::Malformed => "malformed",
            TransportReason::Encode => "encode",
        }
    }
}

impl std::fmt::Display for TransportReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a call made through the facade.
///
/// Each variant maps onto exactly one [`FailureKind`]; see [`ClientError::kind`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// No usable response reached the client.
    #[error("transport error ({reason}): {message}")]
    Transport {
        reason: TransportReason,
        message: String,
    },

    /// No response within the configured duration.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A response arrived with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: StatusCode, message: String },

    /// The envelope code differs from the success code.
    #[error("application error {code}: {message}")]
    Application { code: i64, message: String },

    /// Authentication expired and could not be recovered.
    #[error("authentication expired: {message}")]
    AuthExpired { message: String },

    /// Invalid facade or call configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Create a transport error with an explicit reason.
    pub fn transport<S: Into<String>>(reason: TransportReason, message: S) -> Self {
        ClientError::Transport {
            reason,
            message: message.into(),
        }
    }

    /// Create a connection failure.
    pub fn connect<S: Into<String>>(message: S) -> Self {
        Self::transport(TransportReason::Connect, message)
    }

    /// Create an abort failure.
    pub fn aborted<S: Into<String>>(message: S) -> Self {
        Self::transport(TransportReason::Aborted, message)
    }

    /// Create a malformed-response failure.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::transport(TransportReason::Malformed, message)
    }

    /// Create a request encoding failure.
    pub fn encode<S: Into<String>>(message: S) -> Self {
        Self::transport(TransportReason::Encode, message)
    }

    /// Create an HTTP status failure.
    pub fn http_status<S: Into<String>>(status: StatusCode, message: S) -> Self {
        ClientError::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create an application failure.
    pub fn application<S: Into<String>>(code: i64, message: S) -> Self {
        ClientError::Application {
            code,
            message: message.into(),
        }
    }

    /// Create an expired-authentication failure.
    pub fn auth_expired<S: Into<String>>(message: S) -> Self {
        ClientError::AuthExpired {
            message: message.into(),
        }
    }

    /// Create a configuration failure.
    pub fn config<S: Into<String>>(message: S) -> Self {
        ClientError::Config(message.into())
    }

    /// The failure kind of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Transport { .. } => FailureKind::Transport,
            ClientError::Timeout(_) => FailureKind::Timeout,
            ClientError::HttpStatus { .. } => FailureKind::HttpStatus,
            ClientError::Application { .. } => FailureKind::Application,
            ClientError::AuthExpired { .. } => FailureKind::AuthExpired,
            ClientError::Config(_) => FailureKind::Config,
        }
    }

    /// The human-readable message carried by this error.
    pub fn message(&self) -> String {
        match self {
            ClientError::Transport { message, .. }
            | ClientError::HttpStatus { message, .. }
            | ClientError::Application { message, .. }
            | ClientError::AuthExpired { message } => message.clone(),
            ClientError::Timeout(_) => self.to_string(),
            ClientError::Config(message) => message.clone(),
        }
    }

    /// The HTTP status, for [`ClientError::HttpStatus`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The envelope code, for [`ClientError::Application`].
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::Application { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The transport reason, for [`ClientError::Transport`].
    pub fn transport_reason(&self) -> Option<TransportReason> {
        match self {
            ClientError::Transport { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Returns whether this error is a caller- or canceler-initiated abort.
    pub fn is_aborted(&self) -> bool {
        self.transport_reason() == Some(TransportReason::Aborted)
    }

    /// Returns whether retrying the same request may succeed.
    ///
    /// Connection failures, unreadable bodies, timeouts and gateway-style
    /// statuses (502, 503, 504) are retryable. Aborts are not: the caller
    /// asked for the call to stop.
    ///
    /// # Example
    ///
    /// ```
    /// use dualfetch_client::ClientError;
    ///
    /// assert!(ClientError::connect("connection refused").is_retryable());
    /// assert!(!ClientError::aborted("cancelled").is_retryable());
    /// assert!(!ClientError::application(5001, "bad input").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { reason, .. } => {
                matches!(reason, TransportReason::Connect | TransportReason::Body)
            }
            ClientError::Timeout(_) => true,
            ClientError::HttpStatus { status, .. } => matches!(
                *status,
                StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            _ => false,
        }
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed(msg) => ClientError::malformed(msg),
            EnvelopeError::Application { code, message } => {
                ClientError::Application { code, message }
            }
            EnvelopeError::AuthExpired { message } => ClientError::AuthExpired { message },
        }
    }
}
