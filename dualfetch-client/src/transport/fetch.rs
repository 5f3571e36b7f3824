//! The standard-fetch backend, built on hyper_util's legacy client.

use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tower_service::Service;

use super::connector::{build_https_connector, default_tls_config};
use super::{Backend, BackendHandle};
use crate::ClientError;
use crate::config::ResolvedOptions;
use crate::descriptor::RequestDescriptor;
use crate::error::TransportReason;
use crate::pipeline::{Exchange, Pipeline};
use crate::request::RawRequest;
use crate::response::{RawResponse, Reply};

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Backend on top of hyper_util's pooled client.
///
/// Timeouts and cancellation are applied around the whole exchange,
/// including reading the body.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::{FetchBackend, Pipeline};
/// use std::time::Duration;
///
/// let backend = FetchBackend::builder()
///     .pool_idle_timeout(Duration::from_secs(60))
///     .build(Pipeline::new(hooks))?;
/// ```
#[derive(Clone)]
pub struct FetchBackend {
    client: HyperClient,
    pipeline: Pipeline,
    http2_only: bool,
}

impl std::fmt::Debug for FetchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchBackend")
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl FetchBackend {
    pub fn builder() -> FetchBackendBuilder {
        FetchBackendBuilder::new()
    }

    /// Create a backend with default settings.
    pub fn new(pipeline: Pipeline) -> Result<Self, ClientError> {
        Self::builder().build(pipeline)
    }

    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }
}

async fn send(client: HyperClient, request: RawRequest) -> Result<RawResponse, ClientError> {
    let timeout = request.timeout;
    let cancel = request.cancel.clone().unwrap_or_default();
    let url = request.url.clone();
    let request = request.into_http()?;

    let call = async move {
        let response = client
            .request(request)
            .await
            .map_err(|e| ClientError::connect(format!("request failed: {e}")))?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| {
                ClientError::transport(TransportReason::Body, format!("failed to read body: {e}"))
            })?
            .to_bytes();
        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
            url,
        })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::aborted("request cancelled")),
        result = tokio::time::timeout(timeout, call) => {
            result.unwrap_or(Err(ClientError::Timeout(timeout)))
        }
    }
}

impl Exchange for FetchBackend {
    fn exchange(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, ClientError>> {
        Box::pin(send(self.client.clone(), request))
    }
}

impl Backend for FetchBackend {
    fn id(&self) -> &str {
        BackendHandle::FETCH
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
}

// Raw exchange as a tower service, without the pipeline.
impl Service<RawRequest> for FetchBackend {
    type Response = RawResponse;
    type Error = ClientError;
    type Future = BoxFuture<'static, Result<RawResponse, ClientError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // hyper_util legacy::Client is always ready
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RawRequest) -> Self::Future {
        Box::pin(send(self.client.clone(), request))
    }
}

/// Builder for [`FetchBackend`].
pub struct FetchBackendBuilder {
    tls_config: Option<ClientConfig>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
}

impl Default for FetchBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchBackendBuilder {
    pub fn new() -> Self {
        Self {
            tls_config: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }

    /// Set a custom TLS configuration, e.g. for private roots or mTLS.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Speak HTTP/2 without the HTTP/1.1 upgrade.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the backend around `pipeline`.
    pub fn build(self, pipeline: Pipeline) -> Result<FetchBackend, ClientError> {
        let tls_config = match self.tls_config {
            Some(config) => config,
            None => default_tls_config()?,
        };
        let connector = build_https_connector(tls_config);

        let mut builder = Client::builder(TokioExecutor::new());
        // required for pool_idle_timeout to work
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);
        if self.http2_only {
            builder.http2_only(true);
        }

        Ok(FetchBackend {
            client: builder.build(connector),
            pipeline,
            http2_only: self.http2_only,
        })
    }
}

impl std::fmt::Debug for FetchBackendBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchBackendBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}
