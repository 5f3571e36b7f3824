//! The per-call pipeline shared by every backend.
//!
//! A backend only knows how to move a [`RawRequest`] over the network
//! ([`Exchange`]). Everything else runs here, identically for each backend:
//! hooks, query encoding, GET retries, expired-token recovery with a single
//! replay, HTTP status checks and the response transform.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::Method;
use reqwest::Url;
use serde_json::Value;

use crate::ClientError;
use crate::config::{ResolvedOptions, retry_with_policy};
use crate::descriptor::RequestDescriptor;
use crate::hooks::{ResponseAction, TransformHooks, append_query, is_absolute};
use crate::notify::status_message;
use crate::refresh::RefreshCoordinator;
use crate::request::{RawRequest, RequestBody};
use crate::response::{RawResponse, Reply};

/// Raw network I/O for one prepared request.
///
/// Implementations apply the request's timeout and cancellation token.
pub trait Exchange: Send + Sync {
    fn exchange(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, ClientError>>;
}

/// Hooks plus the optional refresh coordinator, owned by one backend.
#[derive(Clone)]
pub struct Pipeline {
    hooks: Arc<dyn TransformHooks>,
    coordinator: Option<Arc<RefreshCoordinator>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new<H: TransformHooks>(hooks: H) -> Self {
        Self {
            hooks: Arc::new(hooks),
            coordinator: None,
        }
    }

    /// Recover expired tokens through `coordinator`.
    ///
    /// Without a coordinator an expired token fails the call directly.
    pub fn with_coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn hooks(&self) -> &Arc<dyn TransformHooks> {
        &self.hooks
    }

    pub fn coordinator(&self) -> Option<&Arc<RefreshCoordinator>> {
        self.coordinator.as_ref()
    }

    /// Run one call through the hooks and `exchange`.
    ///
    /// `descriptor` is never modified; every stage works on a derived copy.
    pub async fn run<E>(
        &self,
        exchange: &E,
        descriptor: &RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<Reply, ClientError>
    where
        E: Exchange + ?Sized,
    {
        let hooks = &self.hooks;
        let mut current = descriptor.clone();

        loop {
            let generation = self.coordinator.as_ref().map_or(0, |c| c.generation());

            let prepared = hooks
                .before_request(current.clone(), options)
                .map_err(|e| hooks.request_catch(e, options))?;
            let request = prepare(&prepared, &current, options)
                .and_then(|raw| hooks.request_interceptor(raw, &prepared, options))
                .map_err(|e| hooks.request_catch(e, options))?;

            let response = send(exchange, request, options)
                .await
                .map_err(|e| hooks.request_catch(e, options))?;

            let action = hooks
                .response_interceptor(response, options)
                .await
                .map_err(|e| hooks.request_catch(e, options))?;

            let response = match action {
                ResponseAction::Proceed(response) => response,
                ResponseAction::AuthExpired { message } => {
                    let coordinator = match &self.coordinator {
                        Some(coordinator) if !current.is_retried() => coordinator,
                        _ => {
                            let err = ClientError::auth_expired(message);
                            return Err(hooks.request_catch(err, options));
                        }
                    };
                    let recovery = coordinator.recover(generation);
                    let recovered = match &current.cancel {
                        // A dropped waiter is skipped when the queue drains.
                        Some(cancel) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                Err(ClientError::aborted("request cancelled during token refresh"))
                            }
                            outcome = recovery => outcome,
                        },
                        None => recovery.await,
                    };
                    recovered.map_err(|e| hooks.request_catch(e, options))?;

                    #[cfg(feature = "tracing")]
                    tracing::debug!(url = %current.url, "replaying request after token refresh");

                    current = current.mark_retried();
                    continue;
                }
            };

            if !response.is_success() {
                let status = response.status;
                return Err(hooks.request_catch(
                    ClientError::http_status(status, status_message(status)),
                    options,
                ));
            }

            return hooks
                .transform_response(response, &prepared, options)
                .map_err(|e| hooks.response_catch(e, options));
        }
    }
}

/// Build the raw request from the hook-adjusted descriptor.
fn prepare(
    prepared: &RequestDescriptor,
    original: &RequestDescriptor,
    options: &ResolvedOptions,
) -> Result<RawRequest, ClientError> {
    let url = append_query(&prepared.url, &prepared.params)?;
    if !is_absolute(&url) {
        return Err(ClientError::config(format!(
            "cannot send relative URL {url:?}; configure apiUrl"
        )));
    }
    // Both backends receive the same percent-encoded form.
    let url = Url::parse(&url)
        .map_err(|e| ClientError::config(format!("invalid URL {url:?}: {e}")))?
        .to_string();

    let mut headers = options.headers.clone();
    headers.extend(prepared.headers.clone());

    let dedupe_key = (!options.ignore_cancel_token).then(|| supersede_key(original));

    Ok(RawRequest {
        method: prepared.method.clone(),
        url,
        headers,
        body: prepared.body.clone(),
        timeout: prepared.timeout.unwrap_or(options.timeout),
        cancel: prepared.cancel.clone(),
        dedupe_key,
    })
}

/// Identity of a call for superseding: method, URL, params and body as the
/// caller supplied them.
fn supersede_key(descriptor: &RequestDescriptor) -> String {
    let body = match &descriptor.body {
        RequestBody::Json(value) => value.to_string(),
        RequestBody::Text(text) => text.clone(),
        RequestBody::Bytes(bytes) => format!("{} bytes", bytes.len()),
        RequestBody::Empty => String::new(),
    };
    format!(
        "{}&{}&{}&{}",
        descriptor.method,
        descriptor.url,
        Value::Object(descriptor.params.clone()),
        body
    )
}

/// Send `request`, retrying GET transport failures and timeouts when
/// `retryRequest` is enabled. HTTP statuses are never retried here.
async fn send<E>(
    exchange: &E,
    request: RawRequest,
    options: &ResolvedOptions,
) -> Result<RawResponse, ClientError>
where
    E: Exchange + ?Sized,
{
    let retry = &options.retry_request;
    if request.method == Method::GET && retry.is_open_retry {
        retry_with_policy(&retry.policy(), || exchange.exchange(request.clone())).await
    } else {
        exchange.exchange(request).await
    }
}
