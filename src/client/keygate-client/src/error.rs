//! Client error types.

use std::fmt;

use thiserror::Error;

use keygate_trust::TrustError;

/// Errors talking to a single gateway.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Trust material could not be loaded or applied.
    #[error("trust error: {0}")]
    Trust(#[from] TrustError),

    /// A gateway URL could not be parsed.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Connection, TLS handshake or timeout failure.
    #[error("request failed: {0}")]
    Http(String),

    /// The gateway answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The gateway answered with an unusable body.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        // The top-level message hides TLS causes such as an unknown issuer.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Http(message)
    }
}

/// A candidate that could not be selected.
#[derive(Debug)]
pub struct ProbeFailure {
    /// The candidate base URL.
    pub candidate: String,
    /// Why the probe failed.
    pub error: ClientError,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.error)
    }
}

/// Errors selecting a gateway.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The candidate list is empty.
    #[error("no gateway candidates configured")]
    NoCandidates,

    /// Every candidate failed its probe.
    #[error("all {} gateway candidates failed: {}", .failures.len(), join(.failures))]
    Exhausted {
        /// One entry per candidate, in probe order.
        failures: Vec<ProbeFailure>,
    },
}

fn join(failures: &[ProbeFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
