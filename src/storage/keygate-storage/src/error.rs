//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid key or value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),
}
