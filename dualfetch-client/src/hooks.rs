//! Transform hooks run around every call.
//!
//! The pipeline calls the hooks in a fixed order:
//!
//! 1. [`before_request`](TransformHooks::before_request) on a clone of the descriptor
//! 2. [`request_interceptor`](TransformHooks::request_interceptor) on the prepared request
//! 3. the backend performs the network call
//! 4. [`response_interceptor`](TransformHooks::response_interceptor), which may report an expired token
//! 5. [`transform_response`](TransformHooks::transform_response)
//!
//! Failures before a response is accepted go through
//! [`request_catch`](TransformHooks::request_catch); failures while
//! transforming go through [`response_catch`](TransformHooks::response_catch).
//!
//! Every method has a passthrough default, so a bundle only overrides the
//! stages it cares about. The unit type `()` is the all-passthrough bundle.
//!
//! # Example
//!
//! ```ignore
//! use dualfetch_client::{ClientError, RawRequest, RequestDescriptor, ResolvedOptions, TransformHooks};
//!
//! struct TenantHeader;
//!
//! impl TransformHooks for TenantHeader {
//!     fn request_interceptor(
//!         &self,
//!         mut request: RawRequest,
//!         _descriptor: &RequestDescriptor,
//!         _options: &ResolvedOptions,
//!     ) -> Result<RawRequest, ClientError> {
//!         request.headers.insert("x-tenant", "acme".parse().unwrap());
//!         Ok(request)
//!     }
//! }
//! ```

mod params;
mod standard;

use futures::future::BoxFuture;

pub use params::{append_query, format_values, is_absolute, join_path, resolve_url};
pub use standard::StandardHooks;

use crate::ClientError;
use crate::config::ResolvedOptions;
use crate::descriptor::RequestDescriptor;
use crate::request::RawRequest;
use crate::response::{RawResponse, Reply};

/// What the response interceptor decided about a response.
#[derive(Debug)]
pub enum ResponseAction {
    /// Continue with the response.
    Proceed(RawResponse),
    /// The response signals an expired token; recover and replay.
    AuthExpired { message: String },
}

/// A bundle of transform hooks.
///
/// Each backend owns its own instance; bundles are never shared between
/// backends.
pub trait TransformHooks: Send + Sync + 'static {
    /// Derive the descriptor that is actually sent.
    fn before_request(
        &self,
        descriptor: RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<RequestDescriptor, ClientError> {
        let _ = options;
        Ok(descriptor)
    }

    /// Adjust the prepared request right before it is sent.
    fn request_interceptor(
        &self,
        request: RawRequest,
        descriptor: &RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<RawRequest, ClientError> {
        let _ = (descriptor, options);
        Ok(request)
    }

    /// Inspect the raw response.
    fn response_interceptor<'a>(
        &'a self,
        response: RawResponse,
        options: &'a ResolvedOptions,
    ) -> BoxFuture<'a, Result<ResponseAction, ClientError>> {
        let _ = options;
        Box::pin(async move { Ok(ResponseAction::Proceed(response)) })
    }

    /// Turn an accepted response into the caller's value.
    fn transform_response(
        &self,
        response: RawResponse,
        descriptor: &RequestDescriptor,
        options: &ResolvedOptions,
    ) -> Result<Reply, ClientError> {
        let _ = (descriptor, options);
        Ok(Reply::Native(response))
    }

    /// Observe or replace a failure raised before a response was accepted.
    fn request_catch(&self, error: ClientError, options: &ResolvedOptions) -> ClientError {
        let _ = options;
        error
    }

    /// Observe or replace a failure raised while transforming a response.
    fn response_catch(&self, error: ClientError, options: &ResolvedOptions) -> ClientError {
        let _ = options;
        error
    }
}

/// The unit type passes everything through unchanged.
impl TransformHooks for () {}
