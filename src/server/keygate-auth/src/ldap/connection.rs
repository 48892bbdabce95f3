//! Directory connections.
//!
//! Each operation opens its own connection and closes it before returning;
//! connections are never shared between callers.

use std::sync::Arc;
use std::time::Instant;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, warn};

use keygate_trust::TrustPool;

use crate::ldap::url::{host_port, parse_ldap_url};
use crate::ldap::DirectoryBindConfig;
use crate::AuthError;

/// LDAP result code for a bind with wrong credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Result of a simple bind that reached a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The directory accepted the credentials.
    Accepted,
    /// The directory rejected the credentials.
    Rejected,
}

/// Maps a bind result code to an outcome. Codes other than success and
/// invalid credentials mean the directory could not decide.
pub(crate) fn classify_bind(rc: u32, text: &str) -> Result<BindOutcome, AuthError> {
    match rc {
        0 => Ok(BindOutcome::Accepted),
        RC_INVALID_CREDENTIALS => Ok(BindOutcome::Rejected),
        rc => Err(AuthError::Directory(format!(
            "bind failed with result code {rc}: {text}"
        ))),
    }
}

/// Shared TLS settings of directory connections.
pub(crate) type DirectoryTls = Arc<ldap_rustls::ClientConfig>;

/// Builds the TLS settings of `config` once, loading its trust pool.
pub(crate) fn load_directory_tls(config: &DirectoryBindConfig) -> Result<DirectoryTls, AuthError> {
    let roots = config.trust_pool()?;
    Ok(Arc::new(directory_tls_config(roots.as_ref())))
}

/// TLS settings for directory connections.
///
/// Without a pool the platform trust store is used; otherwise exactly the
/// pool's certificates are trusted and an empty pool rejects every server.
pub(crate) fn directory_tls_config(
    roots: Option<&TrustPool>,
) -> ldap_rustls::ClientConfig {
    let pool;
    let roots = match roots {
        Some(roots) => roots,
        None => {
            pool = TrustPool::platform();
            &pool
        },
    };

    let ders: Vec<Vec<u8>> = roots.certificates().iter().map(|c| c.to_vec()).collect();
    let mut store = ldap_rustls::RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(&ders);
    if ignored > 0 {
        warn!(added, ignored, "Skipped unparsable directory root certificates");
    }

    ldap_rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(store)
        .with_no_client_auth()
}

/// An open, not yet bound, directory connection.
pub(crate) struct DirectoryConnection {
    ldap: Ldap,
    server: String,
    timeout: std::time::Duration,
}

impl DirectoryConnection {
    /// Opens a TLS connection, verifying the server certificate against the
    /// configured roots and the URL host name.
    pub(crate) async fn open(
        config: &DirectoryBindConfig,
        tls: &DirectoryTls,
    ) -> Result<Self, AuthError> {
        let url = parse_ldap_url(&config.server_url)?;
        let (host, port) = host_port(&url);
        let server = format!("{host}:{port}");
        let timeout = config.timeout();

        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_config(Arc::clone(tls));

        let start = Instant::now();
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &format!("ldaps://{server}"))
            .await
            .map_err(|e| {
                let elapsed_ms = start.elapsed().as_millis();
                warn!(server = %server, elapsed_ms, error = %e, "Directory connection failed");
                AuthError::Directory(format!(
                    "connection to {server} failed after {elapsed_ms}ms: {e}"
                ))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!(error = %e, "Directory connection closed with error");
            }
        });

        debug!(server = %server, elapsed_ms = start.elapsed().as_millis(), "Directory connected");
        Ok(Self {
            ldap,
            server,
            timeout,
        })
    }

    /// Performs a simple bind.
    pub(crate) async fn bind(
        &mut self,
        dn: &str,
        password: &str,
    ) -> Result<BindOutcome, AuthError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| {
                warn!(server = %self.server, dn = %dn, error = %e, "Bind failure");
                AuthError::Directory(format!("bind on {} failed: {e}", self.server))
            })?;

        let outcome = classify_bind(result.rc, &result.text);
        match &outcome {
            Ok(BindOutcome::Accepted) => debug!(server = %self.server, dn = %dn, "Bind accepted"),
            Ok(BindOutcome::Rejected) => {
                warn!(server = %self.server, dn = %dn, "Bind rejected: invalid credentials")
            },
            Err(e) => warn!(server = %self.server, dn = %dn, error = %e, "Bind failure"),
        }
        outcome
    }

    /// Searches the whole subtree under `base`.
    pub(crate) async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>, AuthError> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .await
            .and_then(|result| result.success())
            .map_err(|e| {
                AuthError::Directory(format!(
                    "search under '{base}' on {} failed: {e}",
                    self.server
                ))
            })?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    /// Unbinds and closes the connection.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!(server = %self.server, error = %e, "Unbind failed");
        }
    }
}

/// Checks `bind_dn`/`password` by binding to the directory.
///
/// Wrong credentials yield `Ok(false)`; any other failure is an error. An
/// empty password is rejected without contacting the server, since most
/// directories treat it as an anonymous bind that always succeeds.
pub async fn check_ldap_user_password(
    config: &DirectoryBindConfig,
    bind_dn: &str,
    password: &str,
) -> Result<bool, AuthError> {
    if password.is_empty() {
        debug!(dn = %bind_dn, "Empty password rejected");
        return Ok(false);
    }
    let tls = load_directory_tls(config)?;
    bind_as(config, &tls, bind_dn, password).await
}

/// Binds as `bind_dn`. Callers reject empty passwords first.
pub(crate) async fn bind_as(
    config: &DirectoryBindConfig,
    tls: &DirectoryTls,
    bind_dn: &str,
    password: &str,
) -> Result<bool, AuthError> {
    let mut conn = DirectoryConnection::open(config, tls).await?;
    let outcome = conn.bind(bind_dn, password).await;
    conn.close().await;

    Ok(outcome? == BindOutcome::Accepted)
}
