//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`Client`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dualfetch_core::EnvelopeConfig;

use crate::ClientError;
use crate::auth::{AesGcmEncryptor, BodyEncryptor, MemoryTokenStore, TokenRefresher, TokenStore};
use crate::client::Client;
use crate::config::{FacadeConfig, RequestOptions};
use crate::hooks::{StandardHooks, TransformHooks};
use crate::notify::{Notifier, TracingNotifier};
use crate::pipeline::Pipeline;
use crate::refresh::RefreshCoordinator;
use crate::transport::{Backend, BackendHandle, FetchBackendBuilder, RichClientBackend};

type HooksFactory = Box<dyn Fn() -> Pipeline + Send + Sync>;
type BackendFactory = Box<dyn FnOnce(Pipeline) -> Result<Arc<dyn Backend>, ClientError> + Send>;

/// Builder for creating a [`Client`].
///
/// Both built-in backends are always registered, as `"rich"` and `"fetch"`.
/// Each backend gets its own hook bundle instance from the hooks factory.
///
/// # Example
///
/// ```ignore
/// use dualfetch_client::{BackendHandle, ClientBuilder, EndpointRefresher, RequestOptions};
///
/// let client = ClientBuilder::new()
///     .default_backend(BackendHandle::fetch())
///     .base_options(RequestOptions::new().api_url("https://api.example.com").url_prefix("/api"))
///     .refresher(EndpointRefresher::new("https://api.example.com/auth/refresh"))
///     .build()?;
/// ```
pub struct ClientBuilder {
    default_backend: BackendHandle,
    base: RequestOptions,
    envelope: EnvelopeConfig,
    tokens: Arc<dyn TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    notifier: Arc<dyn Notifier>,
    encryptor: Arc<dyn BodyEncryptor>,
    hooks: Option<HooksFactory>,
    reqwest_client: Option<reqwest::Client>,
    fetch: FetchBackendBuilder,
    custom: Vec<(String, BackendFactory)>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("default_backend", &self.default_backend)
            .field("base", &self.base)
            .field("envelope", &self.envelope)
            .field("refresher", &self.refresher.is_some())
            .field("custom_hooks", &self.hooks.is_some())
            .field("reqwest_client", &self.reqwest_client.is_some())
            .field("fetch", &self.fetch)
            .field(
                "custom_backends",
                &self.custom.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            default_backend: BackendHandle::rich(),
            base: RequestOptions::new(),
            envelope: EnvelopeConfig::default(),
            tokens: Arc::new(MemoryTokenStore::new()),
            refresher: None,
            notifier: Arc::new(TracingNotifier),
            encryptor: Arc::new(AesGcmEncryptor),
            hooks: None,
            reqwest_client: None,
            fetch: FetchBackendBuilder::new(),
            custom: Vec::new(),
        }
    }

    /// Start from a parsed [`FacadeConfig`].
    pub fn from_config(config: FacadeConfig) -> Self {
        Self::new()
            .default_backend(config.default_backend.unwrap_or_default())
            .base_options(config.base_config)
            .envelope(config.envelope)
    }

    /// Backend used when a call doesn't pick one. Default: `"rich"`.
    pub fn default_backend(mut self, handle: BackendHandle) -> Self {
        self.default_backend = handle;
        self
    }

    /// Options layered between the hard-coded defaults and per-call options.
    pub fn base_options(mut self, options: RequestOptions) -> Self {
        self.base = options;
        self
    }

    /// Envelope codes for the standard hooks.
    pub fn envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = envelope;
        self
    }

    /// Default: a fresh [`MemoryTokenStore`].
    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Enable expired-token recovery through `refresher`.
    ///
    /// Without a refresher an expired token fails the call.
    pub fn refresher<R: TokenRefresher + 'static>(mut self, refresher: R) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    /// Default: [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Default: [`AesGcmEncryptor`].
    pub fn encryptor(mut self, encryptor: Arc<dyn BodyEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    /// Replace the standard hooks.
    ///
    /// `factory` runs once per backend so no two backends share a bundle.
    pub fn hooks<H, F>(mut self, factory: F) -> Self
    where
        H: TransformHooks,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.hooks = Some(Box::new(move || Pipeline::new(factory())));
        self
    }

    /// Use an existing `reqwest` client for the rich backend.
    ///
    /// The client should not follow redirects, or the rich backend will
    /// answer differently from the fetch backend. See
    /// [`RichClientBackend::default_client`].
    pub fn reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.reqwest_client = Some(client);
        self
    }

    /// Settings for the fetch backend.
    pub fn fetch_backend(mut self, builder: FetchBackendBuilder) -> Self {
        self.fetch = builder;
        self
    }

    /// Register an extra backend under `name`.
    ///
    /// `make` receives the pipeline the backend must run calls through.
    pub fn with_backend<S, B, F>(mut self, name: S, make: F) -> Self
    where
        S: Into<String>,
        B: Backend + 'static,
        F: FnOnce(Pipeline) -> Result<B, ClientError> + Send + 'static,
    {
        let factory: BackendFactory =
            Box::new(move |pipeline| Ok(Arc::new(make(pipeline)?) as Arc<dyn Backend>));
        self.custom.push((name.into(), factory));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the base options are invalid, the
    /// default backend isn't registered, or a backend fails to build.
    pub fn build(self) -> Result<Client, ClientError> {
        let ClientBuilder {
            default_backend,
            base,
            envelope,
            tokens,
            refresher,
            notifier,
            encryptor,
            hooks,
            reqwest_client,
            fetch,
            custom,
        } = self;

        base.clone().resolve()?;

        let coordinator = refresher.map(|refresher| {
            Arc::new(RefreshCoordinator::new(
                refresher,
                tokens.clone(),
                notifier.clone(),
            ))
        });

        let make_pipeline = || {
            let pipeline = match &hooks {
                Some(factory) => factory(),
                None => Pipeline::new(
                    StandardHooks::new(tokens.clone())
                        .encryptor(encryptor.clone())
                        .notifier(notifier.clone())
                        .envelope(envelope.clone()),
                ),
            };
            match &coordinator {
                Some(coordinator) => pipeline.with_coordinator(coordinator.clone()),
                None => pipeline,
            }
        };

        let mut backends: BTreeMap<String, Arc<dyn Backend>> = BTreeMap::new();
        backends.insert(
            BackendHandle::RICH.to_owned(),
            Arc::new(RichClientBackend::new(
                match reqwest_client {
                    Some(client) => client,
                    None => RichClientBackend::default_client()?,
                },
                make_pipeline(),
            )),
        );
        backends.insert(
            BackendHandle::FETCH.to_owned(),
            Arc::new(fetch.build(make_pipeline())?),
        );
        for (name, make) in custom {
            backends.insert(name, make(make_pipeline())?);
        }

        if !backends.contains_key(default_backend.as_str()) {
            return Err(ClientError::config(format!(
                "unknown default backend: {default_backend}"
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            default_backend = %default_backend,
            backends = ?backends.keys().collect::<Vec<_>>(),
            refresh = coordinator.is_some(),
            "built client"
        );

        Ok(Client::from_parts(default_backend, base, backends, coordinator))
    }
}
