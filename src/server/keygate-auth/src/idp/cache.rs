//! Primary authentication cache.
//!
//! Entries are keyed by username and expire `ttl` after insertion. Expired
//! entries are ignored on lookup and removed lazily. Each entry remembers a
//! keyed digest of the password that produced it, so a cached answer is only
//! reused for the same credentials.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::idp::api::PrimaryResponse;

type HmacSha256 = Hmac<Sha256>;

/// A cached primary authentication.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub response: Arc<PrimaryResponse>,
    pub accepted: bool,
    pub expires_at: Instant,
    pub push_started_at: Option<Instant>,
    password_digest: [u8; 32],
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub(crate) struct AuthCache {
    entries: DashMap<String, CacheEntry>,
    flights: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
    key: Zeroizing<[u8; 32]>,
}

impl AuthCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut key[..]);
        Self {
            entries: DashMap::new(),
            flights: DashMap::new(),
            ttl,
            key,
        }
    }

    fn mac(&self, username: &str, password: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key[..]).expect("HMAC can take key of any size");
        mac.update(username.as_bytes());
        mac.update(&[0]);
        mac.update(password.as_bytes());
        mac
    }

    /// Live entry for `username` produced by `password`.
    pub(crate) fn lookup(&self, username: &str, password: &str) -> Option<CacheEntry> {
        let entry = self.live(username)?;
        self.mac(username, password)
            .verify_slice(&entry.password_digest)
            .is_ok()
            .then_some(entry)
    }

    /// Live entry for `username`, whatever the password.
    pub(crate) fn live(&self, username: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(username) {
            if entry.is_live(now) {
                return Some(entry.clone());
            }
        }
        self.entries.remove_if(username, |_, e| !e.is_live(now));
        None
    }

    /// Replaces the entry for `username`.
    pub(crate) fn insert(
        &self,
        username: &str,
        password: &str,
        response: PrimaryResponse,
        accepted: bool,
    ) -> CacheEntry {
        let mut password_digest = [0u8; 32];
        password_digest.copy_from_slice(&self.mac(username, password).finalize().into_bytes());
        let entry = CacheEntry {
            response: Arc::new(response),
            accepted,
            expires_at: Instant::now() + self.ttl,
            push_started_at: None,
            password_digest,
        };
        self.entries.insert(username.to_string(), entry.clone());
        entry
    }

    /// Records the first push challenge for a live entry, returning when the
    /// challenge was first issued.
    pub(crate) fn mark_push_started(&self, username: &str) -> Option<Instant> {
        let now = Instant::now();
        match self.entries.entry(username.to_string()) {
            Entry::Occupied(mut entry) if entry.get().is_live(now) => {
                let started = *entry.get_mut().push_started_at.get_or_insert(now);
                Some(started)
            },
            _ => None,
        }
    }

    /// Drops the entry for `username`, forcing the next login to reach the
    /// provider.
    pub(crate) fn invalidate(&self, username: &str) {
        self.entries.remove(username);
    }

    /// Per-username lock serializing provider calls for the same user.
    pub(crate) fn flight(&self, username: &str) -> Arc<Mutex<()>> {
        self.flights.entry(username.to_string()).or_default().clone()
    }

    /// Forgets the lock of a finished flight nobody else is waiting on.
    pub(crate) fn release_flight(&self, username: &str, flight: Arc<Mutex<()>>) {
        self.flights
            .remove_if(username, |_, m| Arc::ptr_eq(m, &flight) && Arc::strong_count(m) <= 2);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
