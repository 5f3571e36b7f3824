//! The rich-client backend, built on `reqwest`.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::canceler::PendingRegistry;
use super::{Backend, BackendHandle};
use crate::ClientError;
use crate::config::ResolvedOptions;
use crate::descriptor::RequestDescriptor;
use crate::error::TransportReason;
use crate::pipeline::{Exchange, Pipeline};
use crate::request::RawRequest;
use crate::response::{RawResponse, Reply};

/// Backend on top of a `reqwest::Client`.
///
/// Every call is registered with a [`PendingRegistry`] while in flight, so
/// identical calls can supersede each other (when `ignoreCancelToken` is
/// false) and [`cancel_all_pending`](Self::cancel_all_pending) can abort
/// everything at once.
///
/// Redirects are returned to the pipeline as-is, like the fetch backend
/// does. A client passed to [`new`](Self::new) should keep that policy;
/// [`default_client`](Self::default_client) builds one that does.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::{Pipeline, RichClientBackend, StandardHooks};
///
/// let client = RichClientBackend::default_client()?;
/// let backend = RichClientBackend::new(client, Pipeline::new(hooks));
/// ```
#[derive(Clone)]
pub struct RichClientBackend {
    client: reqwest::Client,
    pipeline: Pipeline,
    pending: PendingRegistry,
}

impl std::fmt::Debug for RichClientBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RichClientBackend")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl RichClientBackend {
    pub fn new(client: reqwest::Client, pipeline: Pipeline) -> Self {
        Self {
            client,
            pipeline,
            pending: PendingRegistry::new(),
        }
    }

    /// A `reqwest` client that does not follow redirects.
    pub fn default_client() -> Result<reqwest::Client, ClientError> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {e}")))
    }

    /// The registry of in-flight calls.
    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    async fn send(&self, request: RawRequest) -> Result<RawResponse, ClientError> {
        let token = request
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let _guard = self.pending.register(request.dedupe_key.clone(), token.clone());

        let timeout = request.timeout;
        let headers = request.effective_headers();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers)
            .timeout(timeout);
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_bytes()?);
        }

        let url = request.url;
        let call = async move {
            let response = builder
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, timeout))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(e, timeout))?;
            Ok(RawResponse {
                status,
                headers,
                body,
                url,
            })
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ClientError::aborted("request cancelled")),
            result = call => result,
        }
    }
}

impl Exchange for RichClientBackend {
    fn exchange(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, ClientError>> {
        Box::pin(self.send(request))
    }
}

impl Backend for RichClientBackend {
    fn id(&self) -> &str {
        BackendHandle::RICH
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn request<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
        options: &'a ResolvedOptions,
    ) -> BoxFuture<'a, Result<Reply, ClientError>> {
        Box::pin(self.pipeline.run(self, descriptor, options))
    }

    fn cancel_all_pending(&self) -> usize {
        self.pending.cancel_all()
    }
}

/// Map a `reqwest` failure onto the client taxonomy.
pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(timeout)
    } else if err.is_builder() {
        ClientError::config(format!("invalid request: {err}"))
    } else if err.is_body() || err.is_decode() {
        ClientError::transport(TransportReason::Body, format!("failed to read body: {err}"))
    } else {
        ClientError::connect(format!("request failed: {err}"))
    }
}
