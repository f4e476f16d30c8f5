//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Readers take the current snapshot under a short read lock. Refreshes are serialized
//! through `refresh_lock`, so at most one fetch is in flight; a task that waited for the
//! lock re-checks the snapshot before fetching again.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::keys::{KeySet, KeyStore, KeyStoreError, ResolvedKey};

/// Raw JWKS document. Keys are parsed one by one in [`KeySet::from_jwk_values`].
#[derive(Debug, Deserialize)]
struct JwksDocument {
    #[serde(default)]
    keys: Vec<serde_json::Value>,
}

struct KeySnapshot {
    keys: KeySet,
    fetched_at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum RefreshTrigger {
    // Snapshot missing or older than `refresh_interval`.
    Expired,
    // Token names a kid the snapshot fetched at this instant does not know.
    UnknownKid(Instant),
}

#[derive(Debug, Clone, Copy)]
struct FetchAttempt {
    at: Instant,
    succeeded: bool,
}

/// JWKS cache with interval-based and unknown-kid refresh.
pub struct JwksCache {
    jwks_url: Url,
    http_client: reqwest::Client,
    refresh_interval: Duration,
    min_refresh_interval: Duration,
    snapshot: RwLock<Option<Arc<KeySnapshot>>>,
    // Guards the fetch; holds the last fetch attempt and its outcome.
    refresh_lock: Mutex<Option<FetchAttempt>>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_url", &self.jwks_url.as_str())
            .field("refresh_interval", &self.refresh_interval)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field(
                "age",
                &self.last_fetched_at().ok().flatten().map(|at| at.elapsed()),
            )
            .finish()
    }
}

impl JwksCache {
    pub fn new(
        jwks_url: Url,
        refresh_interval: Duration,
        min_refresh_interval: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, KeyStoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(KeyStoreError::Fetch)?;

        Ok(Self {
            jwks_url,
            http_client,
            refresh_interval,
            min_refresh_interval,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(None),
        })
    }

    /// Instant of the last successful fetch, if any.
    pub fn last_fetched_at(&self) -> Result<Option<Instant>, KeyStoreError> {
        Ok(self.current()?.map(|s| s.fetched_at))
    }

    /// Initial fetch at startup. Failure is not fatal; requests fail closed until keys load.
    pub async fn prime(&self) {
        match self.refresh(RefreshTrigger::Expired).await {
            Ok(_) => {}
            Err(err) => warn!(
                url = %self.jwks_url,
                error = %err,
                "initial JWKS fetch failed; private routes will reject until keys load"
            ),
        }
    }

    fn current(&self) -> Result<Option<Arc<KeySnapshot>>, KeyStoreError> {
        let snapshot = self.snapshot.read().map_err(|_| KeyStoreError::Poisoned)?;
        Ok(snapshot.clone())
    }

    fn is_fresh(&self, snapshot: &KeySnapshot) -> bool {
        snapshot.fetched_at.elapsed() < self.refresh_interval
    }

    async fn fresh_snapshot(&self) -> Result<Arc<KeySnapshot>, KeyStoreError> {
        if let Some(snapshot) = self.current()? {
            if self.is_fresh(&snapshot) {
                return Ok(snapshot);
            }
        }

        self.refresh(RefreshTrigger::Expired).await
    }

    async fn refresh(&self, trigger: RefreshTrigger) -> Result<Arc<KeySnapshot>, KeyStoreError> {
        let mut last_attempt = self.refresh_lock.lock().await;

        let recent = last_attempt.filter(|attempt| attempt.at.elapsed() < self.min_refresh_interval);
        let recently_attempted = recent.is_some();
        let recently_failed = recent.is_some_and(|attempt| !attempt.succeeded);

        match (self.current()?, trigger) {
            (Some(snapshot), RefreshTrigger::Expired) if self.is_fresh(&snapshot) => {
                return Ok(snapshot);
            }
            (Some(snapshot), RefreshTrigger::UnknownKid(seen)) => {
                if snapshot.fetched_at > seen || recently_attempted {
                    return Ok(snapshot);
                }
            }
            // Stale or missing, and the last attempt in the window failed.
            (_, RefreshTrigger::Expired) if recently_failed => {
                return Err(KeyStoreError::Unavailable);
            }
            _ => {}
        }

        let started = Instant::now();
        let fetched = self.fetch().await;
        *last_attempt = Some(FetchAttempt {
            at: started,
            succeeded: fetched.is_ok(),
        });

        let snapshot = Arc::new(KeySnapshot {
            keys: fetched?,
            fetched_at: Instant::now(),
        });

        {
            let mut current = self.snapshot.write().map_err(|_| KeyStoreError::Poisoned)?;
            *current = Some(Arc::clone(&snapshot));
        }

        info!(
            url = %self.jwks_url,
            key_count = snapshot.keys.len(),
            trigger = ?trigger,
            "JWKS cache refreshed"
        );

        Ok(snapshot)
    }

    async fn fetch(&self) -> Result<KeySet, KeyStoreError> {
        debug!(url = %self.jwks_url, "fetching JWKS");

        let response = self
            .http_client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(KeyStoreError::Fetch)?;

        if !response.status().is_success() {
            return Err(KeyStoreError::Status(response.status()));
        }

        let document: JwksDocument = response.json().await.map_err(KeyStoreError::Fetch)?;

        KeySet::from_jwk_values(document.keys)
    }
}

#[async_trait]
impl KeyStore for JwksCache {
    fn source_name(&self) -> &'static str {
        "jwks"
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<ResolvedKey, KeyStoreError> {
        let snapshot = self.fresh_snapshot().await?;
        if let Some(key) = snapshot.keys.get(kid) {
            return Ok(key.clone());
        }

        // `get(None)` only misses on an empty set, which `KeySet` never builds.
        let Some(kid) = kid else {
            return Err(KeyStoreError::NoUsableKeys);
        };

        debug!(kid = %kid, "kid not found in cached JWKS, refreshing");
        let snapshot = self
            .refresh(RefreshTrigger::UnknownKid(snapshot.fetched_at))
            .await?;

        snapshot
            .keys
            .get(Some(kid))
            .cloned()
            .ok_or_else(|| KeyStoreError::UnknownKid(kid.to_string()))
    }
}
