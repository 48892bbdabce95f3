//! rustls client configuration.

use std::sync::Arc;

use rustls::ClientConfig;

use crate::pool::platform_root_store;
use crate::{ClientIdentity, TrustError, TrustPool};

/// Builds a TLS client configuration.
///
/// With `roots == None` the platform trust store is used; otherwise exactly
/// the certificates of the pool are trusted. The ring provider is selected
/// explicitly so the config never depends on a process-wide default.
pub fn client_config(
    roots: Option<&TrustPool>,
    identity: Option<&ClientIdentity>,
) -> Result<ClientConfig, TrustError> {
    let root_store = match roots {
        Some(pool) => pool.root_store()?,
        None => platform_root_store(),
    };

    let provider = rustls::crypto::ring::default_provider();
    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TrustError::Config(format!("failed to set protocol versions: {e}")))?
        .with_root_certificates(root_store);

    let config = match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain().to_vec(), identity.key())
            .map_err(|e| TrustError::Config(format!("failed to set client certificate: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}
