//! Transport backends.
//!
//! A [`Backend`] moves a request over the network and runs it through its own
//! [`Pipeline`]. Two implementations share the contract:
//!
//! - [`RichClientBackend`] on `reqwest`, with a pending-request canceler
//! - [`FetchBackend`] on `hyper_util`'s legacy client, usable as a tower service
//!
//! Given the same descriptor and the same hook outcomes, both produce the
//! same result. Picking one over the other is a transport concern only.
//!
//! # Feature Flags
//!
//! TLS for [`FetchBackend`] requires enabling the appropriate features:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod canceler;
mod connector;
mod fetch;
mod rich;

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use canceler::{PendingGuard, PendingRegistry};
pub use connector::{build_https_connector, default_tls_config, has_tls_support};
pub use fetch::{FetchBackend, FetchBackendBuilder};
pub use rich::RichClientBackend;

pub(crate) use rich::map_reqwest_error;

use crate::ClientError;
use crate::config::ResolvedOptions;
use crate::descriptor::RequestDescriptor;
use crate::pipeline::Pipeline;
use crate::response::Reply;

/// A transport backend.
pub trait Backend: Send + Sync {
    /// Identifier used to select this backend.
    fn id(&self) -> &str;

    /// The pipeline this backend runs calls through.
    fn pipeline(&self) -> &Pipeline;

    /// Run one call.
    fn request<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
        options: &'a ResolvedOptions,
    ) -> BoxFuture<'a, Result<Reply, ClientError>>;

    /// Cancel every in-flight call this backend tracks.
    ///
    /// Returns the number of cancelled calls. Backends without a canceler
    /// return 0.
    fn cancel_all_pending(&self) -> usize {
        0
    }
}

/// Names a backend for one call or as the facade default.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendHandle(String);

impl BackendHandle {
    pub const RICH: &'static str = "rich";
    pub const FETCH: &'static str = "fetch";

    /// The `reqwest` backend.
    pub fn rich() -> Self {
        Self(Self::RICH.to_owned())
    }

    /// The `hyper` backend.
    pub fn fetch() -> Self {
        Self(Self::FETCH.to_owned())
    }

    /// A backend registered under a custom name.
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BackendHandle {
    fn default() -> Self {
        Self::rich()
    }
}

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
