//! TLS setup for the fetch backend.
//!
//! TLS needs both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one): `tls-ring` (default with `tls`) or `tls-aws-lc`.
//!   Without either, a globally installed rustls provider is used.
//! - **Root certificates** (choose one): `tls-native-roots` (default with `tls`)
//!   or `tls-webpki-roots`.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

use crate::ClientError;

/// Returns true if both a crypto provider and root certificates are compiled in.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))
}

fn crypto_provider() -> Result<Arc<rustls::crypto::CryptoProvider>, ClientError> {
    #[cfg(feature = "tls-ring")]
    return Ok(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Ok(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .ok_or_else(|| {
            ClientError::config(
                "HTTPS requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
                 or install one with `CryptoProvider::install_default()`",
            )
        })
}

fn root_store() -> rustls::RootCertStore {
    #[allow(unused_mut)]
    let mut roots = rustls::RootCertStore::empty();

    #[cfg(feature = "tls-native-roots")]
    {
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native.errors);
        }
        roots.add_parsable_certificates(native.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    roots
}

/// Build the default TLS configuration from the enabled features.
///
/// Without a root certificate feature the root store is empty: plain
/// `http://` still works, `https://` fails certificate verification.
pub fn default_tls_config() -> Result<ClientConfig, ClientError> {
    let config = ClientConfig::builder_with_provider(crypto_provider()?)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::config(format!("invalid TLS protocol versions: {e}")))?
        .with_root_certificates(root_store())
        .with_no_client_auth();
    Ok(config)
}

/// Build a connector that speaks both `http://` and `https://`.
pub fn build_https_connector(tls_config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_all_versions()
        .build()
}
