//! Authentication error types.
//!
//! A wrong password, a wrong code or a denied push is never an error: those
//! are reported as `Ok(false)` or a [`PushResponse`](crate::PushResponse).
//! Every variant here means no decision could be made.

use thiserror::Error;

use keygate_storage::StorageError;
use keygate_trust::TrustError;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A second factor was requested without a live primary authentication.
    #[error("no live primary authentication session for user '{0}'")]
    StaleSession(String),

    /// The user has no enrolled factor of the requested kind.
    #[error("no {factor} factor enrolled for user '{username}'")]
    FactorNotEnrolled {
        /// User the factor was looked up for.
        username: String,
        /// Factor kind (`otp`, `push`).
        factor: &'static str,
    },

    /// Authentication method not enabled.
    #[error("auth method not enabled: {0}")]
    MethodNotEnabled(String),

    /// Backend configuration error (wrong URL scheme, non-bcrypt hash, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The identity provider could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The identity provider answered with something unusable.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// The identity provider throttled the request.
    #[error("identity provider rate limit exceeded")]
    RateLimited,

    /// Directory connection, bind or search failure.
    #[error("directory error: {0}")]
    Directory(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A push wait was abandoned by its caller.
    #[error("push wait cancelled")]
    Cancelled,
}

impl AuthError {
    /// Whether the failure is caused by an unavailable dependency rather than
    /// by configuration, so that a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Provider(_) | Self::RateLimited | Self::Directory(_)
        )
    }

    /// Whether no decision could be made because of an outage or a
    /// misconfiguration, as opposed to a stale session or a cancelled wait.
    pub fn is_system_error(&self) -> bool {
        self.is_transient() || matches!(self, Self::Configuration(_) | Self::Storage(_))
    }

    /// Whether the failure is a second-factor request without a live session.
    pub fn is_stale_session(&self) -> bool {
        matches!(self, Self::StaleSession(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<TrustError> for AuthError {
    fn from(err: TrustError) -> Self {
        Self::Configuration(err.to_string())
    }
}
