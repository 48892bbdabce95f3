//! # Keygate Auth
//!
//! Pluggable authentication backends for Keygate.
//!
//! ## Backends
//!
//! - Password file (bcrypt htpasswd)
//! - Directory bind (LDAPS)
//! - External identity provider, with OTP and push second factors
//!
//! Backends implement [`AuthBackend`] and are consulted in order through a
//! [`BackendRegistry`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod htpasswd;
pub mod idp;
pub mod ldap;
pub mod registry;

pub use backend::{AuthBackend, PushResponse};
pub use error::AuthError;
pub use htpasswd::{check_htpasswd_user_password, HtpasswdBackend};
pub use idp::{wait_for_push, IdpBackend, IdpConfig, PushWait};
pub use ldap::{
    check_ldap_user_password, extract_cn, get_ldap_user_groups, parse_ldap_url,
    DirectoryBindConfig, LdapBackend, UserGroups,
};
pub use registry::BackendRegistry;
