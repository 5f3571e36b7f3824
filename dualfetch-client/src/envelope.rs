//! Envelope unwrapping for raw responses.
//!
//! [`unwrap`] is the single entry point the response-transform stage uses,
//! whichever backend produced the response.

use dualfetch_core::{EnvelopeConfig, ResponseEnvelope};

use crate::ClientError;
use crate::config::ResolvedOptions;
use crate::descriptor::ResponseType;
use crate::response::{RawResponse, Reply};

/// A successful unwrap together with the envelope message.
#[derive(Clone, Debug)]
pub struct Unwrapped {
    pub reply: Reply,
    /// The envelope `message`, when an envelope was unwrapped.
    pub message: Option<String>,
}

/// Unwrap `response` into the value handed back to the caller.
///
/// - `isReturnNativeResponse` returns the response untouched.
/// - A non-JSON hint, or `isTransformResponse = false`, returns the coerced
///   body without looking for an envelope.
/// - Otherwise the body must be an envelope; its `data` is returned on the
///   success code and an application or expired-authentication error is
///   raised otherwise.
pub fn unwrap(
    response: RawResponse,
    hint: ResponseType,
    options: &ResolvedOptions,
    config: &EnvelopeConfig,
) -> Result<Reply, ClientError> {
    unwrap_detailed(response, hint, options, config).map(|unwrapped| unwrapped.reply)
}

/// Like [`unwrap`], but also returns the envelope message.
pub fn unwrap_detailed(
    response: RawResponse,
    hint: ResponseType,
    options: &ResolvedOptions,
    config: &EnvelopeConfig,
) -> Result<Unwrapped, ClientError> {
    if options.is_return_native_response {
        return Ok(Unwrapped {
            reply: Reply::Native(response),
            message: None,
        });
    }
    if hint != ResponseType::Json || !options.is_transform_response {
        return Ok(Unwrapped {
            reply: response.coerce(hint)?,
            message: None,
        });
    }

    let envelope = ResponseEnvelope::from_value(response.json()?)?;
    let message = envelope.message.clone();
    let data = envelope.into_result(config)?;
    Ok(Unwrapped {
        reply: Reply::Data(data),
        message: Some(message),
    })
}
