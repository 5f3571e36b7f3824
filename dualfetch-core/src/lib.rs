//! Core wire types for dualfetch.
//!
//! This crate provides the types shared by the request client
//! (`dualfetch-client`) and by anything that has to speak the same
//! response format, such as mock servers in tests.
//!
//! ## Modules
//!
//! - [`envelope`]: The `{code, message, data}` response envelope and its unwrapping rules
//! - [`error`]: The closed set of failure kinds and envelope errors

mod envelope;
mod error;

pub use envelope::*;
pub use error::*;
