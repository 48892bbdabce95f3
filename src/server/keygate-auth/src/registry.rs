//! Ordered registry of active authentication backends.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use keygate_storage::StorageBackend;

use crate::{AuthBackend, AuthError};

/// Backends consulted in registration order.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn AuthBackend>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a backend. Names must be unique.
    pub fn register(&mut self, backend: Arc<dyn AuthBackend>) -> Result<(), AuthError> {
        if self.get(backend.name()).is_some() {
            return Err(AuthError::Configuration(format!(
                "backend '{}' registered twice",
                backend.name()
            )));
        }
        debug!(backend = backend.name(), position = self.backends.len(), "Registered backend");
        self.backends.push(backend);
        Ok(())
    }

    /// Looks up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthBackend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    /// Backend names in consultation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Authenticates against each backend in order, stopping at the first
    /// acceptance.
    ///
    /// Returns the name of the accepting backend, `None` if every backend
    /// rejected the credentials, or the last system error if no backend
    /// accepted and at least one could not decide.
    pub async fn password_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<&'static str>, AuthError> {
        if self.backends.is_empty() {
            return Err(AuthError::Configuration("no authentication backend".into()));
        }

        let mut last_error = None;
        for backend in &self.backends {
            match backend.password_authenticate(username, password).await {
                Ok(true) => {
                    info!(user = %username, backend = backend.name(), "Password accepted");
                    return Ok(Some(backend.name()));
                },
                Ok(false) => {
                    debug!(user = %username, backend = backend.name(), "Password rejected");
                },
                Err(e @ AuthError::Configuration(_)) => {
                    error!(
                        user = %username,
                        backend = backend.name(),
                        error = %e,
                        "Backend is misconfigured"
                    );
                    last_error = Some(e);
                },
                Err(e) => {
                    warn!(
                        user = %username,
                        backend = backend.name(),
                        error = %e,
                        "Backend could not authenticate"
                    );
                    last_error = Some(e);
                },
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                info!(user = %username, "Password rejected by every backend");
                Ok(None)
            },
        }
    }

    /// Runs every backend's storage hook, stopping at the first error.
    pub async fn update_storage(&self, store: &dyn StorageBackend) -> Result<(), AuthError> {
        for backend in &self.backends {
            backend.update_storage(store).await?;
        }
        Ok(())
    }
}
