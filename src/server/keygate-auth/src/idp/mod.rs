//! External identity provider backend.
//!
//! Primary authentication results are cached per user for a short time so
//! that the second factor (OTP or push) can reuse the provider transaction,
//! and so that repeated password checks do not hit the provider's rate
//! limits.

pub mod api;
mod cache;
mod push;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};
use url::Url;

use keygate_trust::maybe_load_root_cas;

use crate::{AuthBackend, AuthError, PushResponse};
use api::{
    Factor, FactorVerifyRequest, FactorVerifyResponse, PrimaryAuthRequest, PrimaryResponse,
    FACTOR_RESULT_REJECTED, FACTOR_RESULT_TIMEOUT, FACTOR_RESULT_WAITING, STATUS_SUCCESS,
};
use cache::{AuthCache, CacheEntry};

pub use push::{wait_for_push, PushWait};

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn duration_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Identity provider backend settings. Durations deserialize from seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpConfig {
    /// How long a primary authentication result is reused.
    #[serde(default = "default_cache_ttl", deserialize_with = "duration_secs")]
    pub cache_ttl: Duration,
    /// How long a push challenge may stay unresolved.
    #[serde(default = "default_push_timeout", deserialize_with = "duration_secs")]
    pub push_timeout: Duration,
    /// Timeout of each provider request.
    #[serde(default = "default_request_timeout", deserialize_with = "duration_secs")]
    pub request_timeout: Duration,
    /// PEM bundle of trusted root CAs. Unset means the platform store.
    #[serde(default)]
    pub root_ca_file: Option<String>,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            push_timeout: default_push_timeout(),
            request_timeout: default_request_timeout(),
            root_ca_file: None,
        }
    }
}

/// Authentication backend delegating to an external identity provider.
pub struct IdpBackend {
    authn_url: Url,
    client: Client,
    config: IdpConfig,
    cache: AuthCache,
}

impl IdpBackend {
    /// Creates a backend for the public authentication API of a tenant.
    pub fn new_public(tenant_domain: &str, config: IdpConfig) -> Result<Self, AuthError> {
        Self::with_authn_url(&format!("https://{tenant_domain}/api/v1/authn"), config)
    }

    /// Creates a backend for an explicit authentication URL.
    pub fn with_authn_url(authn_url: &str, config: IdpConfig) -> Result<Self, AuthError> {
        let authn_url = Url::parse(authn_url).map_err(|e| {
            AuthError::Configuration(format!("invalid authentication URL '{authn_url}': {e}"))
        })?;

        let roots = maybe_load_root_cas(config.root_ca_file.as_deref())?;
        let tls = keygate_trust::client_config(roots.as_ref(), None)?;
        let client = Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;

        debug!(url = %authn_url, "Identity provider backend configured");
        Ok(Self {
            authn_url,
            client,
            cache: AuthCache::new(config.cache_ttl),
            config,
        })
    }

    /// The primary authentication URL.
    pub fn authn_url(&self) -> &Url {
        &self.authn_url
    }

    /// Backend settings.
    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    fn factor_verify_url(&self, factor: &Factor) -> Result<Url, AuthError> {
        let base = self.authn_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/factors/{}/verify", factor.id))
            .map_err(|e| AuthError::Provider(format!("unusable factor id '{}': {e}", factor.id)))
    }

    /// Live, accepted primary authentication for `username`.
    fn session(&self, username: &str) -> Result<CacheEntry, AuthError> {
        match self.cache.live(username) {
            Some(entry) if entry.accepted => Ok(entry),
            _ => {
                debug!(user = %username, "No live primary authentication");
                Err(AuthError::StaleSession(username.to_string()))
            },
        }
    }

    async fn primary_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(PrimaryResponse, bool), AuthError> {
        let response = self
            .client
            .post(self.authn_url.clone())
            .json(&PrimaryAuthRequest { username, password })
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Ok((PrimaryResponse::default(), false)),
            StatusCode::TOO_MANY_REQUESTS => return Err(AuthError::RateLimited),
            status if !status.is_success() => {
                return Err(AuthError::Provider(format!(
                    "primary authentication returned {status}"
                )));
            },
            _ => {},
        }

        let body: PrimaryResponse = response.json().await.map_err(|e| {
            AuthError::Provider(format!("undecodable primary authentication response: {e}"))
        })?;
        let accepted = body.is_accepted();
        if !accepted {
            info!(
                user = %username,
                status = %body.status,
                "Provider refused primary authentication"
            );
        }
        Ok((body, accepted))
    }

    /// Posts to a factor's verify URL. `None` means the provider refused the
    /// transaction (401/403).
    async fn verify_factor(
        &self,
        factor: &Factor,
        state_token: &str,
        pass_code: Option<&str>,
    ) -> Result<Option<FactorVerifyResponse>, AuthError> {
        let url = self.factor_verify_url(factor)?;
        let response = self
            .client
            .post(url)
            .json(&FactorVerifyRequest {
                state_token,
                pass_code,
            })
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            StatusCode::TOO_MANY_REQUESTS => return Err(AuthError::RateLimited),
            status if !status.is_success() => {
                return Err(AuthError::Provider(format!(
                    "factor verification returned {status}"
                )));
            },
            _ => {},
        }

        response.json().await.map(Some).map_err(|e| {
            AuthError::Provider(format!("undecodable factor verification response: {e}"))
        })
    }
}

fn request_error(err: reqwest::Error) -> AuthError {
    if err.is_decode() {
        AuthError::Provider(err.to_string())
    } else {
        AuthError::Transport(err.to_string())
    }
}

fn state_token(entry: &CacheEntry) -> Result<&str, AuthError> {
    entry
        .response
        .state_token
        .as_deref()
        .ok_or_else(|| AuthError::Provider("transaction has no state token".into()))
}

#[async_trait]
impl AuthBackend for IdpBackend {
    fn name(&self) -> &'static str {
        "idp"
    }

    async fn password_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        if let Some(entry) = self.cache.lookup(username, password) {
            debug!(user = %username, accepted = entry.accepted, "Primary authentication cache hit");
            return Ok(entry.accepted);
        }

        let flight = self.cache.flight(username);
        let result = {
            let _guard = flight.lock().await;
            match self.cache.lookup(username, password) {
                Some(entry) => Ok(entry.accepted),
                None => self.primary_authenticate(username, password).await.map(
                    |(response, accepted)| {
                        self.cache.insert(username, password, response, accepted);
                        accepted
                    },
                ),
            }
        };
        self.cache.release_flight(username, flight);

        match &result {
            Ok(true) => info!(
                user = %username,
                cached = self.cache.len(),
                "Primary authentication accepted"
            ),
            Ok(false) => warn!(user = %username, "Primary authentication rejected"),
            Err(e) => warn!(user = %username, error = %e, "Identity provider unavailable"),
        }
        result
    }

    async fn validate_user_otp(&self, username: &str, code: &str) -> Result<bool, AuthError> {
        let entry = self.session(username)?;
        let factor = entry.response.otp_factor().ok_or_else(|| AuthError::FactorNotEnrolled {
            username: username.to_string(),
            factor: "otp",
        })?;

        if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
            debug!(user = %username, "Malformed one-time code");
            return Ok(false);
        }

        let valid = match self
            .verify_factor(factor, state_token(&entry)?, Some(code))
            .await?
        {
            Some(response) => response.status == STATUS_SUCCESS,
            None => false,
        };

        if valid {
            info!(user = %username, factor = %factor.factor_type, "One-time code accepted");
        } else {
            warn!(user = %username, factor = %factor.factor_type, "One-time code rejected");
        }
        Ok(valid)
    }

    async fn validate_user_push(&self, username: &str) -> Result<PushResponse, AuthError> {
        let entry = self.session(username)?;
        let factor = entry.response.push_factor().ok_or_else(|| AuthError::FactorNotEnrolled {
            username: username.to_string(),
            factor: "push",
        })?;

        if let Some(started) = entry.push_started_at {
            if started.elapsed() > self.config.push_timeout {
                info!(user = %username, "Push challenge timed out");
                self.cache.invalidate(username);
                return Ok(PushResponse::Timeout);
            }
        }
        if self.cache.mark_push_started(username).is_none() {
            return Err(AuthError::StaleSession(username.to_string()));
        }

        let Some(response) = self.verify_factor(factor, state_token(&entry)?, None).await? else {
            warn!(user = %username, "Push transaction refused by provider");
            self.cache.invalidate(username);
            return Ok(PushResponse::Rejected);
        };

        let answer = if response.status == STATUS_SUCCESS {
            PushResponse::Approved
        } else {
            match response.factor_result.as_deref() {
                Some(FACTOR_RESULT_WAITING) => PushResponse::Waiting,
                Some(FACTOR_RESULT_REJECTED) => PushResponse::Rejected,
                Some(FACTOR_RESULT_TIMEOUT) => PushResponse::Timeout,
                other => {
                    return Err(AuthError::Provider(format!(
                        "unexpected push result {other:?} with status '{}'",
                        response.status
                    )));
                },
            }
        };

        // A failed challenge needs a fresh transaction.
        if matches!(answer, PushResponse::Rejected | PushResponse::Timeout) {
            self.cache.invalidate(username);
        }
        debug!(user = %username, answer = ?answer, "Push poll");
        Ok(answer)
    }
}
