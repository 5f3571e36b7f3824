//! The request facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::Method;
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::config::RequestOptions;
use crate::descriptor::RequestDescriptor;
use crate::refresh::RefreshCoordinator;
use crate::response::{RawResponse, Reply};
use crate::transport::{Backend, BackendHandle};

/// Entry point for outbound requests.
///
/// A `Client` owns one instance of each registered backend. Every call picks
/// a backend (the per-call `backend` option, else the client default),
/// merges its options over the client's base options and runs through that
/// backend's pipeline.
///
/// Cloning is cheap; clones share backends and the refresh coordinator.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::{Client, RequestDescriptor, RequestOptions};
///
/// let client = Client::builder()
///     .base_options(RequestOptions::new().api_url("http://localhost:3000"))
///     .build()?;
///
/// let users: Vec<User> = client
///     .get(RequestDescriptor::new("/users").param("page", 1), RequestOptions::new())
///     .await?;
/// ```
#[derive(Clone)]
pub struct Client {
    default_backend: BackendHandle,
    base: RequestOptions,
    backends: Arc<BTreeMap<String, Arc<dyn Backend>>>,
    coordinator: Option<Arc<RefreshCoordinator>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("default_backend", &self.default_backend)
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("base", &self.base)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        default_backend: BackendHandle,
        base: RequestOptions,
        backends: BTreeMap<String, Arc<dyn Backend>>,
        coordinator: Option<Arc<RefreshCoordinator>>,
    ) -> Self {
        Self {
            default_backend,
            base,
            backends: Arc::new(backends),
            coordinator,
        }
    }

    pub fn default_backend(&self) -> &BackendHandle {
        &self.default_backend
    }

    /// The facade-level options layer.
    pub fn base_options(&self) -> &RequestOptions {
        &self.base
    }

    /// Look up a registered backend.
    pub fn backend(&self, handle: &BackendHandle) -> Option<&Arc<dyn Backend>> {
        self.backends.get(handle.as_str())
    }

    /// The refresh coordinator, if a token refresher was configured.
    pub fn coordinator(&self) -> Option<&Arc<RefreshCoordinator>> {
        self.coordinator.as_ref()
    }

    /// Cancel every in-flight call on every backend.
    pub fn cancel_all_pending(&self) -> usize {
        self.backends
            .values()
            .map(|backend| backend.cancel_all_pending())
            .sum()
    }

    /// Run a call and return the untyped reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an empty URL, an unknown backend or
    /// invalid options; otherwise whatever the backend's pipeline produced.
    pub async fn request_reply(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Reply, ClientError> {
        if descriptor.url.is_empty() {
            return Err(ClientError::config("request URL is required"));
        }

        let options = self.base.clone().merge(options).resolve()?;
        let handle = options
            .backend
            .clone()
            .unwrap_or_else(|| self.default_backend.clone());
        let backend = self
            .backend(&handle)
            .ok_or_else(|| ClientError::config(format!("unknown backend: {handle}")))?;

        let call = backend.request(&descriptor, &options);

        #[cfg(feature = "tracing")]
        let call = {
            use tracing::Instrument;
            call.instrument(tracing::info_span!(
                "http.request",
                http.method = %descriptor.method,
                http.url = %descriptor.url,
                backend = %handle,
                otel.kind = "client",
            ))
        };

        call.await
    }

    /// Run a call and deserialize the reply into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request_reply(descriptor, options).await?.into_typed()
    }

    /// Run a call and return the transport response without unwrapping.
    pub async fn request_native(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<RawResponse, ClientError> {
        self.request_reply(descriptor, options.is_return_native_response(true))
            .await?
            .into_native()
            .ok_or_else(|| {
                ClientError::config("transform hooks did not return the native response")
            })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request(descriptor.method(Method::GET), options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request(descriptor.method(Method::POST), options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request(descriptor.method(Method::PUT), options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request(descriptor.method(Method::DELETE), options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        self.request(descriptor.method(Method::PATCH), options).await
    }
}
