//! # Keygate Storage
//!
//! Key/value storage abstraction handed to authentication backends so they
//! can persist or refresh backend-local state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryBackend;
