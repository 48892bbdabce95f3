//! Client identity for mutual TLS.

use std::fmt;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::TrustError;

/// Client certificate chain and its private key.
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    /// Builds an identity from PEM-encoded certificate chain and key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TrustError> {
        let mut reader = cert_pem;
        let chain = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;
        if chain.is_empty() {
            return Err(TrustError::NoCertificates("client certificate".into()));
        }

        let mut reader = key_pem;
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|e| TrustError::InvalidKey(e.to_string()))?
            .ok_or_else(|| TrustError::InvalidKey("no private key found".into()))?;

        Ok(Self { chain, key })
    }

    /// Loads an identity from PEM files.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, TrustError> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        let cert_pem = std::fs::read(cert_path).map_err(|e| TrustError::io(cert_path, e))?;
        let key_pem = std::fs::read(key_path).map_err(|e| TrustError::io(key_path, e))?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Certificate chain presented to servers.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub(crate) fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .field("key", &"[redacted]")
            .finish()
    }
}
