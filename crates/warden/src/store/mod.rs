//! Expiry-aware token caching with single-flight refresh.
//!
//! [`TokenStore`] implements get-or-compute-with-TTL on top of any
//! [`TokenBackend`]. Backends only persist entries; expiry checks and
//! fetch deduplication live here, so every backend honors the same contract.
//!
//! ## Concurrency
//!
//! Each cache key owns an async mutex. A live entry is returned without
//! taking it. On a miss, callers queue on the key's mutex; the first one
//! computes and stores the token, and the rest find the fresh entry when
//! they re-check under the lock. At most one compute runs per key at a time,
//! and keys never wait on each other. A key's mutex is dropped once no caller
//! holds or awaits it, so idle keys cost nothing.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use warden_common::{FetchedToken, Token};

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Persistence for cached tokens.
///
/// Backends store and return entries verbatim, expired or not; the
/// [`TokenStore`] decides whether an entry is still live. Errors must be
/// reported rather than treated as a miss.
#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Loads the entry for `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Token>, StoreError>;

    /// Stores `token` under `key`, replacing any previous entry.
    async fn save(&self, key: &str, token: &Token) -> Result<(), StoreError>;

    /// Removes the entry for `key`. Removing a missing entry succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Get-or-compute token cache over a pluggable backend.
pub struct TokenStore {
    backend: Arc<dyn TokenBackend>,
    clock: Arc<dyn Clock>,
    flights: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys_in_flight", &self.flights.len())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Creates a store over `backend` using the system clock.
    pub fn new(backend: Arc<dyn TokenBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            flights: DashMap::new(),
        }
    }

    /// Replaces the clock used for expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The clock used for expiry.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Returns the live token for `key`, computing and storing one if needed.
    ///
    /// If a live entry exists it is returned and `compute` is never called.
    /// Otherwise `compute` runs once and its result is stored with
    /// `expires_at = now + ttl`. Concurrent callers for the same key wait for
    /// that single computation instead of starting their own. A failed
    /// compute stores nothing, so the next call computes again.
    ///
    /// # Errors
    ///
    /// Returns the compute error unchanged, or a [`StoreError`] (converted
    /// into `E`) if the backend fails.
    #[instrument(skip(self, compute))]
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<Token, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<FetchedToken, E>> + Send,
        E: From<StoreError>,
    {
        if let Some(token) = self.load_live(key).await? {
            return Ok(token);
        }

        let flight = self.flight(key);
        let result = {
            let _guard = flight.lock().await;
            self.compute_locked(key, compute).await
        };
        drop(flight);
        self.release_flight(key);

        result
    }

    /// Returns the entry for `key` only if it is still live.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn peek(&self, key: &str) -> Result<Option<Token>, StoreError> {
        self.load_live(key).await
    }

    /// Forcibly expires the entry for `key`.
    ///
    /// Waits for any in-flight computation for the key to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, key: &str) -> Result<(), StoreError> {
        let flight = self.flight(key);
        let result = {
            let _guard = flight.lock().await;
            self.backend.remove(key).await
        };
        drop(flight);
        self.release_flight(key);

        result?;
        debug!("Token invalidated");
        Ok(())
    }

    /// Runs the refresh for `key` while its flight lock is held.
    async fn compute_locked<F, Fut, E>(&self, key: &str, compute: F) -> Result<Token, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<FetchedToken, E>> + Send,
        E: From<StoreError>,
    {
        // Another caller may have stored a token while we waited.
        if let Some(token) = self.load_live(key).await? {
            debug!("Token populated by concurrent refresh");
            return Ok(token);
        }

        let fetched = compute().await?;
        let token = fetched.issue_at(self.clock.now());
        self.backend.save(key, &token).await?;

        debug!(expires_at = %token.expires_at(), "Stored fresh token");
        Ok(token)
    }

    async fn load_live(&self, key: &str) -> Result<Option<Token>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .backend
            .load(key)
            .await?
            .filter(|token| token.is_live_at(now)))
    }

    fn flight(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.flights.entry(key.to_string()).or_default().value())
    }

    /// Drops the lock for `key` once no caller holds or awaits it.
    fn release_flight(&self, key: &str) {
        self.flights
            .remove_if(key, |_, flight| Arc::strong_count(flight) == 1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (TokenStore, Arc<MemoryBackend>, ManualClock) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = ManualClock::new(Utc::now());
        let store = TokenStore::new(Arc::clone(&backend) as Arc<dyn TokenBackend>)
            .with_clock(Arc::new(clock.clone()));
        (store, backend, clock)
    }

    async fn compute_counted(
        calls: &AtomicUsize,
        value: &str,
        ttl_secs: u64,
    ) -> Result<FetchedToken, StoreError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedToken::new(value, Duration::from_secs(ttl_secs)))
    }

    #[tokio::test]
    async fn test_miss_computes_and_stores() {
        let (store, backend, clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        let token = store
            .get_or_compute("k", || compute_counted(&calls, "T1", 120))
            .await
            .unwrap();

        assert_eq!(token.value().expose_secret(), "T1");
        assert_eq!(token.expires_at(), clock.now() + chrono::TimeDelta::seconds(120));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(backend.load("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_live_entry_skips_compute() {
        let (store, _backend, _clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        store
            .get_or_compute("k", || compute_counted(&calls, "T1", 120))
            .await
            .unwrap();
        let token = store
            .get_or_compute("k", || compute_counted(&calls, "T2", 120))
            .await
            .unwrap();

        assert_eq!(token.value().expose_secret(), "T1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes() {
        let (store, _backend, clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        store
            .get_or_compute("k", || compute_counted(&calls, "T1", 120))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(119));
        let token = store
            .get_or_compute("k", || compute_counted(&calls, "T2", 120))
            .await
            .unwrap();
        assert_eq!(token.value().expose_secret(), "T1");

        clock.advance(Duration::from_secs(2));
        let token = store
            .get_or_compute("k", || compute_counted(&calls, "T2", 120))
            .await
            .unwrap();
        assert_eq!(token.value().expose_secret(), "T2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_compute_stores_nothing() {
        let (store, backend, _clock) = store_with_clock();

        let result: Result<Token, StoreError> = store
            .get_or_compute("k", || async { Err(StoreError::Backend("fetch failed".into())) })
            .await;

        assert!(result.is_err());
        assert!(backend.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let (store, _backend, _clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        store
            .get_or_compute("k", || compute_counted(&calls, "T1", 120))
            .await
            .unwrap();
        store.invalidate("k").await.unwrap();
        assert!(store.peek("k").await.unwrap().is_none());

        store
            .get_or_compute("k", || compute_counted(&calls, "T2", 120))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flight_locks_released_after_use() {
        let (store, _backend, _clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        for key in ["a", "b", "c"] {
            store
                .get_or_compute(key, || compute_counted(&calls, "T", 60))
                .await
                .unwrap();
        }
        store.invalidate("a").await.unwrap();
        let _: Result<Token, StoreError> = store
            .get_or_compute("d", || async { Err(StoreError::Backend("down".into())) })
            .await;

        assert!(store.flights.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (store, _backend, _clock) = store_with_clock();
        let calls = AtomicUsize::new(0);

        let a = store
            .get_or_compute("a", || compute_counted(&calls, "TA", 60))
            .await
            .unwrap();
        let b = store
            .get_or_compute("b", || compute_counted(&calls, "TB", 60))
            .await
            .unwrap();

        assert_eq!(a.value().expose_secret(), "TA");
        assert_eq!(b.value().expose_secret(), "TB");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_compute_once() {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryBackend::new())));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    store
                        .get_or_compute("shared", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, StoreError>(FetchedToken::new("T", Duration::from_secs(60)))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.value().expose_secret(), "T");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        struct BrokenBackend;

        #[async_trait]
        impl TokenBackend for BrokenBackend {
            async fn load(&self, _key: &str) -> Result<Option<Token>, StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
            async fn save(&self, _key: &str, _token: &Token) -> Result<(), StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
            async fn remove(&self, _key: &str) -> Result<(), StoreError> {
                Err(StoreError::Backend("unreachable".into()))
            }
        }

        let store = TokenStore::new(Arc::new(BrokenBackend));
        let calls = AtomicUsize::new(0);

        let result = store
            .get_or_compute("k", || compute_counted(&calls, "T", 60))
            .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
