//! Root CA pools.

use std::path::Path;

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use tracing::{debug, warn};

use crate::TrustError;

/// An explicit set of trusted root certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustPool {
    certs: Vec<CertificateDer<'static>>,
}

impl TrustPool {
    /// Creates a pool that trusts nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a PEM bundle into a pool.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::NoCertificates`] if the bundle holds no
    /// certificate, which is almost always a misconfigured path.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustError> {
        let mut pool = Self::empty();
        if pool.add_pem(pem)? == 0 {
            return Err(TrustError::NoCertificates("PEM input".into()));
        }
        Ok(pool)
    }

    /// Loads a PEM bundle from a file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| TrustError::io(path, e))?;
        let mut pool = Self::empty();
        if pool.add_pem(&pem)? == 0 {
            return Err(TrustError::NoCertificates(path.display().to_string()));
        }
        debug!(path = %path.display(), certs = pool.len(), "Loaded root CA bundle");
        Ok(pool)
    }

    /// Appends every certificate of a PEM bundle, returning how many were added.
    pub fn add_pem(&mut self, pem: &[u8]) -> Result<usize, TrustError> {
        let mut reader = pem;
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;
        let added = certs.len();
        self.certs.extend(certs);
        Ok(added)
    }

    /// Appends a single DER certificate.
    pub fn add_der(&mut self, der: CertificateDer<'static>) {
        self.certs.push(der);
    }

    /// Number of certificates in the pool.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the pool trusts nothing.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Certificates held by the pool.
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certs
    }

    /// Loads the operating system trust store into a pool.
    ///
    /// Unreadable platform certificates are logged and skipped.
    pub fn platform() -> Self {
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            warn!(error = %err, "Failed to load a platform root certificate");
        }
        Self { certs: native.certs }
    }

    /// Builds a rustls root store holding exactly this pool.
    pub fn root_store(&self) -> Result<RootCertStore, TrustError> {
        let mut store = RootCertStore::empty();
        for cert in &self.certs {
            store
                .add(cert.clone())
                .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;
        }
        Ok(store)
    }
}

/// Loads the root CA bundle at `path`, or `None` when no path is configured.
///
/// An empty path means "defer to the platform trust store", which is
/// represented as an absent pool rather than an empty one.
pub fn maybe_load_root_cas(path: Option<&str>) -> Result<Option<TrustPool>, TrustError> {
    match path.map(str::trim) {
        None | Some("") => Ok(None),
        Some(path) => TrustPool::from_pem_file(path).map(Some),
    }
}

/// Root store built from the operating system trust store.
pub(crate) fn platform_root_store() -> RootCertStore {
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(TrustPool::platform().certs);
    debug!(added, ignored, "Loaded platform root certificates");
    store
}
