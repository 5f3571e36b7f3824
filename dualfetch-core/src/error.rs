//! Failure kinds and envelope errors.
//!
//! This module provides the core error types of the request layer:
//! - [`FailureKind`]: The closed set of failure kinds a call can end with
//! - [`EnvelopeError`]: Errors raised while unwrapping a response envelope

use std::str::FromStr;

use serde::Serialize;

/// The closed set of ways an outbound call can fail.
///
/// Every error surfaced by the client maps onto exactly one of these kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response reached the client (connection failure, abort, unreadable body).
    Transport,
    /// No response within the configured duration.
    Timeout,
    /// A response arrived with a non-2xx HTTP status.
    HttpStatus,
    /// The envelope code differs from the success code.
    Application,
    /// The envelope (or HTTP status) signals an expired authentication token.
    AuthExpired,
    /// The facade or a call was configured incorrectly.
    Config,
}

impl FailureKind {
    /// Get the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Application => "application",
            FailureKind::AuthExpired => "auth_expired",
            FailureKind::Config => "config",
        }
    }

    /// Returns whether a failure of this kind may go away on a plain retry.
    ///
    /// Only [`Transport`](FailureKind::Transport) and
    /// [`Timeout`](FailureKind::Timeout) qualify; application and
    /// configuration failures are deterministic.
    ///
    /// # Example
    ///
    /// ```
    /// use dualfetch_core::FailureKind;
    ///
    /// assert!(FailureKind::Timeout.is_transient());
    /// assert!(!FailureKind::Application.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::Timeout)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`FailureKind`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseFailureKindError(());

impl std::fmt::Display for ParseFailureKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown failure kind")
    }
}

impl std::error::Error for ParseFailureKindError {}

impl FromStr for FailureKind {
    type Err = ParseFailureKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(FailureKind::Transport),
            "timeout" => Ok(FailureKind::Timeout),
            "http_status" => Ok(FailureKind::HttpStatus),
            "application" => Ok(FailureKind::Application),
            "auth_expired" => Ok(FailureKind::AuthExpired),
            "config" => Ok(FailureKind::Config),
            _ => Err(ParseFailureKindError(())),
        }
    }
}

/// Errors raised while unwrapping a response envelope.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// The body is not an envelope object with an integer `code`.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope carries a non-success code.
    #[error("application error {code}: {message}")]
    Application { code: i64, message: String },

    /// The envelope carries the expired-authentication code.
    #[error("authentication expired: {message}")]
    AuthExpired { message: String },
}

impl EnvelopeError {
    /// The failure kind this envelope error maps to.
    pub fn kind(&self) -> FailureKind {
        match self {
            EnvelopeError::Malformed(_) => FailureKind::Transport,
            EnvelopeError::Application { .. } => FailureKind::Application,
            EnvelopeError::AuthExpired { .. } => FailureKind::AuthExpired,
        }
    }
}
