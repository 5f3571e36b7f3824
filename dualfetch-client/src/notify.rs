//! User-facing notifications.
//!
//! The pipeline never renders anything itself. It reports through a
//! [`Notifier`], according to the call's `errorMessageMode` and
//! `successMessageMode`. [`TracingNotifier`] is the default and only logs.

use http::StatusCode;

/// Receives user-facing notifications from the pipeline.
pub trait Notifier: Send + Sync {
    /// A blocking error dialog.
    fn error_modal(&self, title: &str, message: &str);

    /// A transient error notification.
    fn error_message(&self, message: &str);

    /// A success notification, either transient or blocking.
    fn success_message(&self, message: &str, blocking: bool);

    /// The session could not be recovered and the user must sign in again.
    fn session_expired(&self, message: &str);
}

/// A [`Notifier`] that logs through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error_modal(&self, _title: &str, _message: &str) {
        #[cfg(feature = "tracing")]
        tracing::error!(title = _title, message = _message, "request failed");
    }

    fn error_message(&self, _message: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(message = _message, "request failed");
    }

    fn success_message(&self, _message: &str, _blocking: bool) {
        #[cfg(feature = "tracing")]
        tracing::info!(message = _message, blocking = _blocking, "request succeeded");
    }

    fn session_expired(&self, _message: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(message = _message, "session expired, sign-in required");
    }
}

/// Human-readable message for an HTTP error status.
pub fn status_message(status: StatusCode) -> String {
    let text = match status.as_u16() {
        400 => "Bad request",
        401 => "Not authorized, please sign in again",
        403 => "Access denied",
        404 => "Resource not found",
        405 => "Method not allowed",
        408 => "Request timed out",
        500 => "Internal server error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        505 => "HTTP version not supported",
        _ => return format!("Request failed with status {}", status.as_u16()),
    };
    text.to_string()
}
