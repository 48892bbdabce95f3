//! Authentication backend trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use keygate_storage::StorageBackend;

use crate::AuthError;

/// Outcome of a push-approval poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushResponse {
    /// The user denied the challenge.
    Rejected,
    /// The user approved the challenge.
    Approved,
    /// Challenge issued but not yet resolved; poll again.
    Waiting,
    /// The challenge was not resolved within the allowed time.
    Timeout,
}

impl PushResponse {
    /// Whether polling should stop.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

/// Trait for authentication backends.
///
/// `Ok(false)` is a definitive rejection. `Err` means the backend could not
/// decide and the caller must treat the user as not authenticated without
/// recording a failed login.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Returns the name of this backend for logging and registry lookup.
    fn name(&self) -> &'static str;

    /// Checks a username/password pair.
    async fn password_authenticate(&self, username: &str, password: &str)
        -> Result<bool, AuthError>;

    /// Checks a one-time code for a user who recently passed
    /// [`password_authenticate`](Self::password_authenticate).
    async fn validate_user_otp(&self, username: &str, code: &str) -> Result<bool, AuthError> {
        let _ = (username, code);
        Err(AuthError::MethodNotEnabled(format!("{}: otp", self.name())))
    }

    /// Starts or polls a push-approval challenge. Never blocks waiting for
    /// the user.
    async fn validate_user_push(&self, username: &str) -> Result<PushResponse, AuthError> {
        let _ = username;
        Err(AuthError::MethodNotEnabled(format!("{}: push", self.name())))
    }

    /// Persists or refreshes backend-local state from an external store.
    async fn update_storage(&self, store: &dyn StorageBackend) -> Result<(), AuthError> {
        let _ = store;
        Ok(())
    }
}
