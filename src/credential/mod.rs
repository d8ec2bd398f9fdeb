//! Ephemeral credential cache
//!
//! A shared, time-boxed store of single-use numeric verification codes,
//! keyed by contact address. Every operation takes the one internal lock,
//! so callers observe each operation atomically; the map itself is never
//! exposed. Entries disappear on consumption or expiry; an optional sweep
//! task purges expired entries proactively, though lazy expiry alone is
//! sufficient for correctness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Digits in a generated verification code
pub const CODE_LENGTH: usize = 6;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Default entry time-to-live
    pub ttl: Duration,
    /// Interval between proactive sweeps
    pub sweep_interval: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Why a verification attempt was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// No pending credential for this address
    #[error("verification code not found; request a new one")]
    NotFound,

    /// The pending credential expired and has been removed
    #[error("verification code has expired; request a new one")]
    Expired,

    /// Wrong code; the pending credential is kept so the caller may retry
    #[error("verification code does not match")]
    InvalidCode,
}

struct PendingCredential {
    code: String,
    expires_at: Instant,
    payload: Value,
}

impl PendingCredential {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Lock-guarded store of pending verification credentials
#[derive(Default)]
pub struct CredentialCache {
    entries: Mutex<HashMap<String, PendingCredential>>,
    config: CredentialConfig,
}

impl CredentialCache {
    /// Create a cache with the given configuration
    pub fn new(config: CredentialConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CredentialConfig::default())
    }

    /// Create a credential for the address with the default TTL,
    /// overwriting any prior entry. Returns the generated code.
    pub fn create(&self, address: &str, payload: Value) -> String {
        self.create_with_ttl(address, payload, self.config.ttl)
    }

    /// Create a credential with an explicit TTL
    pub fn create_with_ttl(&self, address: &str, payload: Value, ttl: Duration) -> String {
        let code = generate_code();
        let entry = PendingCredential {
            code: code.clone(),
            expires_at: Instant::now() + ttl,
            payload,
        };

        self.lock().insert(address.to_string(), entry);
        debug!(address = %address, "Credential created");
        code
    }

    /// Verify a code for the address
    ///
    /// Checks existence, then expiry, then the code, in that order. A
    /// match consumes the entry and returns the stored payload exactly
    /// once; a mismatch keeps the entry so the caller may retry before
    /// expiry.
    pub fn verify(&self, address: &str, code: &str) -> Result<Value, VerifyError> {
        let mut entries = self.lock();

        let entry = entries.get(address).ok_or(VerifyError::NotFound)?;

        if entry.is_expired() {
            entries.remove(address);
            return Err(VerifyError::Expired);
        }

        if entry.code != code {
            return Err(VerifyError::InvalidCode);
        }

        let entry = entries.remove(address).expect("entry present under lock");
        Ok(entry.payload)
    }

    /// Whether the address has a live pending credential
    pub fn has(&self, address: &str) -> bool {
        let mut entries = self.lock();
        match entries.get(address) {
            Some(entry) if entry.is_expired() => {
                entries.remove(address);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Remove a pending credential; true when one existed
    pub fn delete(&self, address: &str) -> bool {
        self.lock().remove(address).is_some()
    }

    /// Remove every expired entry; returns how many were purged
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Live entry count
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingCredential>> {
        self.entries.lock().expect("credential cache lock poisoned")
    }
}

/// Spawn a background task that sweeps expired entries periodically
pub fn spawn_sweeper(cache: Arc<CredentialCache>) -> tokio::task::JoinHandle<()> {
    let interval = cache.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "Swept expired credentials");
            }
        }
    })
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}
