//! The standard hook bundle.
//!
//! [`StandardHooks`] implements the behavior described by the request
//! options: URL joining, parameter placement, date formatting, bearer
//! tokens, body encryption, expired-token detection, envelope unwrapping
//! and user notifications.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dualfetch_core::{EnvelopeConfig, peek_code};
use futures::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;

use super::params::{append_query, format_map, format_values, resolve_url};
use super::{ResponseAction, TransformHooks};
use crate::ClientError;
use crate::auth::{AesGcmEncryptor, BodyEncryptor, TokenStore};
use crate::config::{Encrypt, ErrorMessageMode, ResolvedOptions, SuccessMessageMode};
use crate::descriptor::RequestDescriptor;
use crate::envelope::unwrap_detailed;
use crate::notify::{Notifier, TracingNotifier, status_message};
use crate::request::{RawRequest, RequestBody};
use crate::response::{RawResponse, Reply};

/// `X-Encrypted: 0|1`
pub const X_ENCRYPTED: HeaderName = HeaderName::from_static("x-encrypted");
/// `X-Encrypted-Key: <base64 key>`, present only when the body is encrypted.
pub const X_ENCRYPTED_KEY: HeaderName = HeaderName::from_static("x-encrypted-key");
/// Name of the cache-busting query parameter.
pub const TIMESTAMP_PARAM: &str = "_t";

const DEFAULT_SUCCESS_MESSAGE: &str = "Operation succeeded";

/// The standard [`TransformHooks`] implementation.
#[derive(Clone)]
pub struct StandardHooks {
    tokens: Arc<dyn TokenStore>,
    encryptor: Arc<dyn BodyEncryptor>,
    notifier: Arc<dyn Notifier>,
    envelope: EnvelopeConfig,
}

impl std::fmt::Debug for StandardHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardHooks")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

impl StandardHooks {
    /// Hooks reading tokens from `tokens`, with AES-GCM encryption and
    /// tracing notifications.
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            tokens,
            encryptor: Arc::new(AesGcmEncryptor::new()),
            notifier: Arc::new(TracingNotifier),
            envelope: EnvelopeConfig::default(),
        }
    }

    pub fn encryptor(mut self, encryptor: Arc<dyn BodyEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = envelope;
        self
    }

    fn report(&self, error: &ClientError, options: &ResolvedOptions) {
        if error.is_aborted() {
            return;
        }
        let message = error.message();
        match options.error_message_mode {
            ErrorMessageMode::Modal => self.notifier.error_modal("Error", &message),
            ErrorMessageMode::Message => self.notifier.error_message(&message),
            ErrorMessageMode::None => {}
        }
    }

    fn authorization(&self, options: &ResolvedOptions) -> Result<Option<HeaderValue>, ClientError> {
        if !options.with_token {
            return Ok(None);
        }
        let Some(token) = self.tokens.access_token() else {
            return Ok(None);
        };
        let value = if options.authentication_scheme.is_empty() {
            token
        } else {
            format!("{} {}", options.authentication_scheme, token)
        };
        HeaderValue::try_from(value)
            .map(Some)
            .map_err(|_| ClientError::config("access token is not a valid header value"))
    }
}

fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn is_query_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::DELETE
}

fn body_is_blank(body: &RequestBody) -> bool {
    match body {
        RequestBody::Empty | RequestBody::Json(Value::Null) => true,
        RequestBody::Json(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

impl TransformHooks for StandardHooks {
    fn before_request(
        &self,
        mut descriptor: RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<RequestDescriptor, ClientError> {
        descriptor.url = resolve_url(
            &options.api_url,
            &options.url_prefix,
            options.join_prefix,
            &descriptor.url,
        );

        if options.format_date {
            format_map(&mut descriptor.params);
            if let RequestBody::Json(body) = &mut descriptor.body {
                format_values(body);
            }
        }

        if is_query_method(&descriptor.method) {
            if let RequestBody::Json(Value::Object(fields)) = &descriptor.body {
                for (key, value) in fields {
                    descriptor
                        .params
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                descriptor.body = RequestBody::Empty;
            }
            if options.join_time && descriptor.method == Method::GET {
                descriptor
                    .params
                    .insert(TIMESTAMP_PARAM.to_string(), Value::from(timestamp_millis()));
            }
            return Ok(descriptor);
        }

        if body_is_blank(&descriptor.body) && !descriptor.params.is_empty() {
            let params = std::mem::take(&mut descriptor.params);
            descriptor.body = RequestBody::Json(Value::Object(params));
        }

        if options.join_params_to_url {
            let mut query = std::mem::take(&mut descriptor.params);
            if let RequestBody::Json(Value::Object(fields)) = &descriptor.body {
                for (key, value) in fields {
                    query.insert(key.clone(), value.clone());
                }
            }
            descriptor.url = append_query(&descriptor.url, &query)?;
        }

        Ok(descriptor)
    }

    fn request_interceptor(
        &self,
        mut request: RawRequest,
        _descriptor: &RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<RawRequest, ClientError> {
        if let Some(value) = self.authorization(options)? {
            request.headers.insert(AUTHORIZATION, value);
        }

        if options.encrypt.is_on() && matches!(request.body, RequestBody::Json(_)) {
            let plaintext = request.body.to_bytes()?;
            let sealed = self.encryptor.encrypt(&plaintext)?;
            let key = HeaderValue::try_from(sealed.key)
                .map_err(|_| ClientError::encode("encryption key is not a valid header value"))?;
            request.body = RequestBody::Text(sealed.payload);
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            request.headers.insert(X_ENCRYPTED_KEY, key);
            request.headers.insert(X_ENCRYPTED, Encrypt::On.header_value());
        } else {
            request.headers.remove(X_ENCRYPTED_KEY);
            request.headers.insert(X_ENCRYPTED, Encrypt::Off.header_value());
        }

        Ok(request)
    }

    fn response_interceptor<'a>(
        &'a self,
        response: RawResponse,
        _options: &'a ResolvedOptions,
    ) -> BoxFuture<'a, Result<ResponseAction, ClientError>> {
        Box::pin(async move {
            if response.status == StatusCode::UNAUTHORIZED {
                return Ok(ResponseAction::AuthExpired {
                    message: status_message(response.status),
                });
            }
            if response.is_success() {
                if let Ok(body) = serde_json::from_slice::<Value>(&response.body) {
                    if peek_code(&body) == Some(self.envelope.auth_expired_code) {
                        let message = body
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        return Ok(ResponseAction::AuthExpired { message });
                    }
                }
            }
            Ok(ResponseAction::Proceed(response))
        })
    }

    fn transform_response(
        &self,
        response: RawResponse,
        descriptor: &RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<Reply, ClientError> {
        let unwrapped =
            unwrap_detailed(response, descriptor.response_type, options, &self.envelope)?;

        if let Some(message) = &unwrapped.message {
            let message = if message.is_empty() {
                DEFAULT_SUCCESS_MESSAGE
            } else {
                message.as_str()
            };
            match options.success_message_mode {
                SuccessMessageMode::Success => self.notifier.success_message(message, false),
                SuccessMessageMode::Modal => self.notifier.success_message(message, true),
                SuccessMessageMode::None => {}
            }
        }

        Ok(unwrapped.reply)
    }

    fn request_catch(&self, error: ClientError, options: &ResolvedOptions) -> ClientError {
        self.report(&error, options);
        error
    }

    fn response_catch(&self, error: ClientError, options: &ResolvedOptions) -> ClientError {
        self.report(&error, options);
        error
    }
}
