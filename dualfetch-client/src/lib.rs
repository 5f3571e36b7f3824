//! Unified outbound request layer.
//!
//! This crate sends HTTP calls through one of two interchangeable transport
//! backends, runs every call through the same transform pipeline, and
//! recovers from expired tokens with a single shared refresh.
//!
//! ## Features
//!
//! - Two backends with identical behavior: `reqwest` ("rich") and `hyper` ("fetch")
//! - Three-layer option merge: defaults, client base options, per-call options
//! - Transform hooks around every call, with a standard bundle for URL
//!   building, bearer tokens, body encryption and `{code, message, data}` unwrapping
//! - One token refresh for any number of concurrent expired calls, replayed in arrival order
//! - GET retries with backoff, timeouts, cancellation and superseding of duplicate calls
//!
//! ## Example
//!
//! ```ignore
//! use dualfetch_client::{BackendHandle, Client, EndpointRefresher, RequestDescriptor, RequestOptions};
//!
//! let client = Client::builder()
//!     .base_options(RequestOptions::new().api_url("http://localhost:3000").url_prefix("/api"))
//!     .refresher(EndpointRefresher::new("http://localhost:3000/api/auth/refresh"))
//!     .build()?;
//!
//! let user: User = client
//!     .get(RequestDescriptor::new("/users/1"), RequestOptions::new())
//!     .await?;
//!
//! // Force the hyper backend for one call
//! let created: User = client
//!     .post(
//!         RequestDescriptor::new("/users").json(&new_user)?,
//!         RequestOptions::new().backend(BackendHandle::fetch()),
//!     )
//!     .await?;
//! ```
//!
//! ## Expired tokens
//!
//! A response with HTTP status 401, or an envelope whose `code` is the
//! configured auth-expired code, starts a refresh through the configured
//! [`TokenRefresher`]. Calls that expire while a refresh is running wait for
//! it and are replayed with the new token. Each call is replayed at most
//! once; a second expiry fails with [`ClientError::AuthExpired`].
//!
//! ## Feature Flags
//!
//! - `tracing` (default) - `http.request` spans and debug logs
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for the fetch backend
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

pub mod auth;
mod builder;
mod client;
pub mod config;
mod descriptor;
mod envelope;
mod error;
pub mod hooks;
mod notify;
mod pipeline;
mod refresh;
mod request;
mod response;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::Client;
pub use error::{ClientError, TransportReason};

pub use auth::{
    AesGcmEncryptor, BodyEncryptor, EncryptedBody, EndpointRefresher, MemoryTokenStore, RefreshFn,
    TokenPair, TokenRefresher, TokenStore,
};
pub use config::{
    Encrypt, ErrorMessageMode, ExponentialBackoff, FacadeConfig, RequestOptions, ResolvedOptions,
    RetryPolicy, RetryRequest, RetryRequestOptions, SuccessMessageMode, retry_with_policy,
};
pub use descriptor::{RequestDescriptor, ResponseType};
pub use envelope::{Unwrapped, unwrap as unwrap_response, unwrap_detailed};
pub use hooks::{ResponseAction, StandardHooks, TransformHooks};
pub use notify::{Notifier, TracingNotifier, status_message};
pub use pipeline::{Exchange, Pipeline};
pub use refresh::{RefreshCoordinator, RefreshPhase};
pub use request::{RawRequest, RequestBody};
pub use response::{Blob, RawResponse, Reply};
pub use transport::{Backend, BackendHandle, FetchBackend, FetchBackendBuilder, RichClientBackend};

// Re-export core types that users need
pub use dualfetch_core::{EnvelopeConfig, FailureKind, ResponseEnvelope};
