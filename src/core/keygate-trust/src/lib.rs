//! # Keygate Trust
//!
//! Trust material shared by every TLS client in Keygate.
//!
//! - [`TrustPool`]: an explicit set of root CAs loaded from PEM
//! - [`ClientIdentity`]: optional client certificate for mutual TLS
//! - [`client_config`]: a rustls client configuration built from both
//!
//! An absent pool (`None`) means "use the platform trust store". An empty
//! explicit pool trusts nothing and rejects every server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod pool;

pub use config::client_config;
pub use error::TrustError;
pub use identity::ClientIdentity;
pub use pool::{maybe_load_root_cas, TrustPool};
