//! Request configuration.
//!
//! - [`RequestOptions`]: One layer of per-call or facade-level options
//! - [`ResolvedOptions`]: The merged options the pipeline reads
//! - [`FacadeConfig`]: Construction options loadable from JSON
//! - [`RetryPolicy`]: Retry behavior with backoff

mod options;
mod retry;

pub use options::{
    Encrypt, ErrorMessageMode, FacadeConfig, RequestOptions, ResolvedOptions, RetryRequest,
    RetryRequestOptions, SuccessMessageMode, defaults as option_defaults,
};
pub use retry::{ExponentialBackoff, RetryPolicy, defaults, retry_with_policy};
