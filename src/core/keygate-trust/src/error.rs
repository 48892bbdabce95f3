//! Trust material error types.

use thiserror::Error;

/// Errors that can occur while loading trust material.
#[derive(Debug, Error)]
pub enum TrustError {
    /// A PEM file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The PEM input did not contain a single certificate.
    #[error("no certificates found in {0}")]
    NoCertificates(String),

    /// A certificate could not be parsed or added to a root store.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// TLS configuration could not be built.
    #[error("tls configuration error: {0}")]
    Config(String),
}

impl TrustError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
