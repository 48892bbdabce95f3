//! # Keygate Client
//!
//! Client-side pieces for talking to Keygate gateways.
//!
//! - [`ServerSelector`]: picks a reachable gateway among redundant instances
//! - [`fetch_login_info`]: lists the authentication types a gateway accepts
//! - [`build_http_client`]: HTTPS client over an explicit trust pool

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod login;
pub mod selector;

pub use error::{ClientError, ProbeFailure, SelectError};
pub use http::{build_http_client, DEFAULT_REQUEST_TIMEOUT};
pub use login::{fetch_login_info, LoginResponse, AUTH_TYPE_PASSWORD, AUTH_TYPE_U2F, LOGIN_PATH};
pub use selector::{
    parse_candidates, SelectionPolicy, SelectorConfig, ServerSelector, DEFAULT_PROBE_TIMEOUT,
};
