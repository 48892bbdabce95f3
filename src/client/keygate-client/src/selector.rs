//! Gateway selection across redundant instances.
//!
//! Candidates are probed one after the other. The first one that completes a
//! trusted TLS handshake and answers with a success status is selected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use keygate_trust::{maybe_load_root_cas, ClientIdentity};

use crate::http::{build_http_client, DEFAULT_REQUEST_TIMEOUT};
use crate::{ClientError, ProbeFailure, SelectError};

/// Default timeout of a single candidate probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Order in which candidates are probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Always start with the first candidate.
    #[default]
    Ordered,
    /// Start one candidate further on each selection.
    RoundRobin,
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

/// Selector settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Gateway base URLs, in preference order.
    pub candidates: Vec<String>,
    /// Rotate the first candidate across selections.
    #[serde(default)]
    pub round_robin: bool,
    /// Per-candidate probe timeout, in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// PEM bundle of trusted root CAs. Unset means the platform store.
    #[serde(default)]
    pub root_ca_file: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            round_robin: false,
            probe_timeout_secs: default_probe_timeout_secs(),
            root_ca_file: None,
        }
    }
}

impl SelectorConfig {
    /// The configured policy.
    pub fn policy(&self) -> SelectionPolicy {
        if self.round_robin {
            SelectionPolicy::RoundRobin
        } else {
            SelectionPolicy::Ordered
        }
    }
}

/// Picks a reachable gateway among candidates.
#[derive(Debug)]
pub struct ServerSelector {
    candidates: Vec<Url>,
    client: Client,
    policy: SelectionPolicy,
    probe_timeout: Duration,
    next: AtomicUsize,
}

impl ServerSelector {
    /// Creates a selector probing through `client`.
    pub fn new(candidates: Vec<Url>, client: Client, policy: SelectionPolicy) -> Self {
        Self {
            candidates,
            client,
            policy,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            next: AtomicUsize::new(0),
        }
    }

    /// Creates a selector from settings, with an optional client identity.
    pub fn from_config(
        config: &SelectorConfig,
        identity: Option<&ClientIdentity>,
    ) -> Result<Self, ClientError> {
        let candidates = parse_candidates(&config.candidates)?;
        let roots = maybe_load_root_cas(config.root_ca_file.as_deref())?;
        let client = build_http_client(roots.as_ref(), identity, DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::new(candidates, client, config.policy())
            .with_probe_timeout(Duration::from_secs(config.probe_timeout_secs)))
    }

    /// Sets the per-candidate probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Candidates in configured order.
    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    /// The client used for probes, reusable for requests to the selection.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Selection policy.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Returns the first candidate that answers a probe.
    ///
    /// # Errors
    ///
    /// [`SelectError::NoCandidates`] for an empty list, otherwise
    /// [`SelectError::Exhausted`] carrying every candidate's failure.
    pub async fn select(&self) -> Result<Url, SelectError> {
        let count = self.candidates.len();
        if count == 0 {
            return Err(SelectError::NoCandidates);
        }

        let start = match self.policy {
            SelectionPolicy::Ordered => 0,
            SelectionPolicy::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % count,
        };

        let mut failures = Vec::new();
        for offset in 0..count {
            let candidate = &self.candidates[(start + offset) % count];
            match self.probe(candidate).await {
                Ok(()) => {
                    info!(server = %candidate, attempts = offset + 1, "Selected gateway");
                    return Ok(candidate.clone());
                },
                Err(error) => {
                    warn!(server = %candidate, error = %error, "Gateway probe failed");
                    failures.push(ProbeFailure {
                        candidate: candidate.to_string(),
                        error,
                    });
                },
            }
        }

        Err(SelectError::Exhausted { failures })
    }

    async fn probe(&self, candidate: &Url) -> Result<(), ClientError> {
        debug!(server = %candidate, "Probing gateway");
        let response = self
            .client
            .get(candidate.clone())
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Status(status.as_u16()))
        }
    }
}

/// Parses candidate base URLs, skipping blank entries.
pub fn parse_candidates<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Url>, ClientError> {
    raw.iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            Url::parse(s).map_err(|e| ClientError::InvalidUrl {
                url: s.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}
