//! Directory-bind (LDAPS) authentication backend.
//!
//! Users are resolved with a service identity, then authenticated by binding
//! as their own DN. Only `ldaps://` is supported.

mod connection;
mod search;
mod url;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

use keygate_trust::{maybe_load_root_cas, TrustPool};

use crate::{AuthBackend, AuthError};

use connection::{bind_as, load_directory_tls, DirectoryTls};
use search::resolve_user;

pub use connection::{check_ldap_user_password, BindOutcome};
pub use search::{build_search_filter, extract_cn, get_ldap_user_groups, UserGroups};
pub use url::{parse_ldap_url, DEFAULT_LDAPS_PORT};

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_search_filter() -> String {
    "(uid=%s)".to_string()
}

/// Directory connection and user lookup settings.
#[derive(Clone, Deserialize)]
pub struct DirectoryBindConfig {
    /// `ldaps://host[:port]` of the directory.
    pub server_url: String,
    /// DN of the service identity used for user lookups.
    pub bind_dn: String,
    /// Password of the service identity.
    pub bind_password: Zeroizing<String>,
    /// Connect and operation timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// PEM bundle of trusted root CAs. Unset means the platform store.
    #[serde(default)]
    pub root_ca_file: Option<String>,
    /// Already loaded root CAs, taking precedence over `root_ca_file`.
    #[serde(skip)]
    pub root_cas: Option<TrustPool>,
    /// Base DNs searched in order for the user entry.
    #[serde(default)]
    pub user_search_base_dns: Vec<String>,
    /// Search filter with a single `%s` slot for the username.
    #[serde(default = "default_user_search_filter")]
    pub user_search_filter: String,
}

impl DirectoryBindConfig {
    /// Creates a config with default timeout and filter and no search base.
    pub fn new(server_url: &str, bind_dn: &str, bind_password: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            bind_dn: bind_dn.to_string(),
            bind_password: Zeroizing::new(bind_password.to_string()),
            timeout_secs: default_timeout_secs(),
            root_ca_file: None,
            root_cas: None,
            user_search_base_dns: Vec::new(),
            user_search_filter: default_user_search_filter(),
        }
    }

    /// Trusts exactly the given pool.
    pub fn with_root_cas(mut self, pool: TrustPool) -> Self {
        self.root_cas = Some(pool);
        self
    }

    /// Connect and operation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Root CAs to verify the directory against, `None` for the platform store.
    pub fn trust_pool(&self) -> Result<Option<TrustPool>, AuthError> {
        if let Some(pool) = &self.root_cas {
            return Ok(Some(pool.clone()));
        }
        Ok(maybe_load_root_cas(self.root_ca_file.as_deref())?)
    }
}

impl fmt::Debug for DirectoryBindConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryBindConfig")
            .field("server_url", &self.server_url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("root_ca_file", &self.root_ca_file)
            .field("root_cas", &self.root_cas.as_ref().map(TrustPool::len))
            .field("user_search_base_dns", &self.user_search_base_dns)
            .field("user_search_filter", &self.user_search_filter)
            .finish()
    }
}

/// Authentication backend binding against a directory.
///
/// Trust roots are loaded once, when the backend is created.
#[derive(Clone)]
pub struct LdapBackend {
    config: DirectoryBindConfig,
    tls: DirectoryTls,
}

impl LdapBackend {
    /// Creates a backend, validating the server URL and search filter and
    /// loading the trust roots.
    pub fn new(config: DirectoryBindConfig) -> Result<Self, AuthError> {
        parse_ldap_url(&config.server_url)?;
        build_search_filter(&config.user_search_filter, "")?;
        if config.user_search_base_dns.is_empty() {
            return Err(AuthError::Configuration(
                "directory backend needs at least one user search base DN".into(),
            ));
        }
        let tls = load_directory_tls(&config)?;
        Ok(Self { config, tls })
    }

    /// Backend settings.
    pub fn config(&self) -> &DirectoryBindConfig {
        &self.config
    }
}

impl fmt::Debug for LdapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthBackend for LdapBackend {
    fn name(&self) -> &'static str {
        "ldap"
    }

    async fn password_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        if password.is_empty() {
            debug!(user = %username, "Empty password rejected");
            return Ok(false);
        }

        let user = resolve_user(&self.config, &self.tls, username).await?;
        if !user.is_found() {
            info!(user = %username, "Directory user not found");
            return Ok(false);
        }

        bind_as(&self.config, &self.tls, &user.user_dn, password).await
    }
}
