//! Directory server URLs.

use url::Url;

use crate::AuthError;

/// Port used when an `ldaps://` URL does not name one.
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Parses a directory URL, accepting only the `ldaps` scheme.
///
/// Plain `ldap://` (and StartTLS upgrades of it) is refused so credentials
/// never cross the wire before the TLS handshake.
pub fn parse_ldap_url(raw: &str) -> Result<Url, AuthError> {
    let url = Url::parse(raw)
        .map_err(|e| AuthError::Configuration(format!("invalid directory URL '{raw}': {e}")))?;

    if url.scheme() != "ldaps" {
        return Err(AuthError::Configuration(format!(
            "unsupported directory scheme '{}' (only ldaps is accepted)",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AuthError::Configuration(format!(
            "directory URL '{raw}' has no host"
        )));
    }
    Ok(url)
}

/// `host:port` of a parsed directory URL, defaulting the port to 636.
pub(crate) fn host_port(url: &Url) -> (String, u16) {
    let host = url.host_str().unwrap_or_default().to_string();
    (host, url.port().unwrap_or(DEFAULT_LDAPS_PORT))
}
