//! Gateway login metadata.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::ClientError;

/// Path of the login metadata endpoint.
pub const LOGIN_PATH: &str = "/api/v0/login";

/// Certificate issuance after password authentication.
pub const AUTH_TYPE_PASSWORD: &str = "password";
/// Certificate issuance after a U2F/WebAuthn second factor.
pub const AUTH_TYPE_U2F: &str = "U2F";

/// Body of the login metadata endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Human readable status.
    pub message: String,
    /// Enabled certificate-authentication backends.
    #[serde(default)]
    pub auth_backend: Vec<String>,
}

impl LoginResponse {
    /// Whether the gateway accepts the given authentication type.
    pub fn supports(&self, auth_type: &str) -> bool {
        self.auth_backend.iter().any(|b| b == auth_type)
    }
}

/// Joins `path` to a gateway base URL, keeping any base path.
pub(crate) fn endpoint(server: &Url, path: &str) -> Result<Url, ClientError> {
    let joined = format!("{}{path}", server.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| ClientError::InvalidUrl {
        url: joined,
        reason: e.to_string(),
    })
}

/// Fetches the login metadata of a gateway.
pub async fn fetch_login_info(client: &Client, server: &Url) -> Result<LoginResponse, ClientError> {
    let url = endpoint(server, LOGIN_PATH)?;
    let response = client.get(url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status(status.as_u16()));
    }

    let login: LoginResponse = response.json().await?;
    debug!(server = %server, backends = ?login.auth_backend, "Fetched login metadata");
    Ok(login)
}
