//! HTTP client construction.

use std::time::Duration;

use reqwest::Client;

use keygate_trust::{client_config, ClientIdentity, TrustPool};

use crate::ClientError;

/// Default timeout of gateway requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds an HTTPS client trusting `roots` (platform store when `None`) and
/// presenting `identity` for mutual TLS when given.
pub fn build_http_client(
    roots: Option<&TrustPool>,
    identity: Option<&ClientIdentity>,
    timeout: Duration,
) -> Result<Client, ClientError> {
    let tls = client_config(roots, identity)?;
    Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Http(format!("failed to create HTTP client: {e}")))
}
