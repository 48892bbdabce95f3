//! Identity provider wire types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary authentication passed, no second factor needed.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Primary authentication passed, a second factor is required.
pub const STATUS_MFA_REQUIRED: &str = "MFA_REQUIRED";
/// Primary authentication passed, the password expires soon.
pub const STATUS_PASSWORD_WARN: &str = "PASSWORD_WARN";

/// Factor type of software TOTP tokens.
pub const FACTOR_TOTP: &str = "token:software:totp";
/// Prefix shared by every token factor type.
pub const FACTOR_TOKEN_PREFIX: &str = "token:";
/// Factor type of push approvals.
pub const FACTOR_PUSH: &str = "push";

/// Push challenge still pending.
pub const FACTOR_RESULT_WAITING: &str = "WAITING";
/// Push challenge denied.
pub const FACTOR_RESULT_REJECTED: &str = "REJECTED";
/// Push challenge expired on the provider side.
pub const FACTOR_RESULT_TIMEOUT: &str = "TIMEOUT";

#[derive(Serialize)]
pub(crate) struct PrimaryAuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FactorVerifyRequest<'a> {
    pub state_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_code: Option<&'a str>,
}

/// Response of a primary authentication.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryResponse {
    /// Transaction status.
    #[serde(default)]
    pub status: String,
    /// Token identifying the transaction for factor verification.
    #[serde(default)]
    pub state_token: Option<String>,
    /// Embedded resources.
    #[serde(rename = "_embedded", default)]
    pub embedded: Embedded,
}

impl PrimaryResponse {
    /// Whether the status means the password was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self.status.as_str(),
            STATUS_SUCCESS | STATUS_MFA_REQUIRED | STATUS_PASSWORD_WARN
        )
    }

    /// The TOTP factor if enrolled, else any token factor.
    pub fn otp_factor(&self) -> Option<&Factor> {
        let factors = &self.embedded.factors;
        factors
            .iter()
            .find(|f| f.factor_type == FACTOR_TOTP)
            .or_else(|| factors.iter().find(|f| f.factor_type.starts_with(FACTOR_TOKEN_PREFIX)))
    }

    /// The push factor, if enrolled.
    pub fn push_factor(&self) -> Option<&Factor> {
        self.embedded.factors.iter().find(|f| f.factor_type == FACTOR_PUSH)
    }
}

impl fmt::Debug for PrimaryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryResponse")
            .field("status", &self.status)
            .field("state_token", &self.state_token.as_ref().map(|_| "[REDACTED]"))
            .field("embedded", &self.embedded)
            .finish()
    }
}

/// `_embedded` section of a primary response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    /// Factors enrolled for the user.
    #[serde(default)]
    pub factors: Vec<Factor>,
}

/// An enrolled factor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    /// Factor identifier used in the verify URL.
    pub id: String,
    /// Factor type, such as `push` or `token:software:totp`.
    pub factor_type: String,
}

/// Response of a factor verification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorVerifyResponse {
    /// Transaction status.
    #[serde(default)]
    pub status: String,
    /// Push challenge state.
    #[serde(default)]
    pub factor_result: Option<String>,
}
