//! Password-file (htpasswd) authentication backend.
//!
//! Only bcrypt hashes are understood. Any other scheme in the file is a
//! configuration error, never a failed login.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use keygate_storage::StorageBackend;

use crate::{AuthBackend, AuthError};

/// Storage key holding the password file for [`HtpasswdBackend::update_storage`].
pub const HTPASSWD_STORAGE_KEY: &str = "htpasswd";

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Parses htpasswd content into a `username -> hash` map.
///
/// Blank lines and `#` comments are skipped. Later duplicates win.
pub fn parse_htpasswd(bytes: &[u8]) -> Result<HashMap<String, String>, AuthError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AuthError::Configuration(format!("htpasswd is not valid UTF-8: {e}")))?;

    let mut entries = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(':') {
            Some((user, hash)) if !user.is_empty() => {
                entries.insert(user.to_string(), hash.to_string());
            },
            _ => {
                return Err(AuthError::Configuration(format!(
                    "malformed htpasswd line {}",
                    lineno + 1
                )));
            },
        }
    }
    Ok(entries)
}

/// Checks a password against a bcrypt hash.
fn verify_bcrypt(username: &str, hash: &str, password: &str) -> Result<bool, AuthError> {
    if !BCRYPT_PREFIXES.iter().any(|p| hash.starts_with(p)) {
        return Err(AuthError::Configuration(format!(
            "htpasswd entry for '{username}' is not a bcrypt hash"
        )));
    }
    bcrypt::verify(password, hash).map_err(|e| {
        AuthError::Configuration(format!("invalid bcrypt hash for '{username}': {e}"))
    })
}

/// Checks `username`/`password` against raw htpasswd content.
///
/// Unknown users and wrong passwords yield `Ok(false)`.
pub fn check_htpasswd_user_password(
    username: &str,
    password: &str,
    htpasswd: &[u8],
) -> Result<bool, AuthError> {
    let entries = parse_htpasswd(htpasswd)?;
    match entries.get(username) {
        Some(hash) => verify_bcrypt(username, hash, password),
        None => Ok(false),
    }
}

/// Authentication backend over a parsed password file.
pub struct HtpasswdBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl HtpasswdBackend {
    /// Creates a backend from htpasswd content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuthError> {
        Ok(Self {
            entries: RwLock::new(parse_htpasswd(bytes)?),
        })
    }

    /// Creates a backend from an htpasswd file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            AuthError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Number of users in the file.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the file holds no user.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuthBackend for HtpasswdBackend {
    fn name(&self) -> &'static str {
        "htpasswd"
    }

    async fn password_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        let hash = self.entries.read().await.get(username).cloned();
        let Some(hash) = hash else {
            debug!(user = %username, "User not in password file");
            return Ok(false);
        };

        let valid = verify_bcrypt(username, &hash, password)?;
        if !valid {
            warn!(user = %username, "Password rejected by password file");
        }
        Ok(valid)
    }

    async fn update_storage(&self, store: &dyn StorageBackend) -> Result<(), AuthError> {
        let Some(bytes) = store.get(HTPASSWD_STORAGE_KEY).await? else {
            return Ok(());
        };
        let entries = parse_htpasswd(&bytes)?;
        let users = entries.len();
        *self.entries.write().await = entries;
        info!(users, "Reloaded password file from storage");
        Ok(())
    }
}
