//! Named-backend cache manager.
//!
//! Routes every operation to a registered backend ("memory", "redis", ...)
//! with a configurable default. Backend failures never reach the caller:
//! each operation absorbs [`CacheError`] into a neutral value and a logged
//! warning, because the cache is an optimization, not a correctness
//! dependency. The single exception is [`CacheManager::try_incr`], which the
//! rate limiter consumes to detect counter-store outages and fall back.
//!
//! One manager is constructed by the application's composition root and
//! shared as an `Arc`; there is no hidden global instance.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CacheBackend;
use crate::core::error::{CacheError, CacheResult};

/// Options for [`CacheManager::get_or_compute`].
#[derive(Debug, Clone, Default)]
pub struct ComputeOptions {
    /// TTL for a freshly computed value
    pub ttl_secs: Option<u64>,
    /// Cache a computed value that serializes to JSON `null`
    pub cache_null: bool,
}

/// Builder for [`CacheManager`].
pub struct CacheManagerBuilder {
    backends: HashMap<String, Arc<dyn CacheBackend>>,
    default_backend: String,
}

impl CacheManagerBuilder {
    pub fn backend(mut self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    pub fn default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = name.into();
        self
    }

    pub fn build(self) -> CacheManager {
        CacheManager {
            backends: self.backends,
            default_backend: self.default_backend,
            initialized: AtomicBool::new(false),
            maintenance: Mutex::new(Vec::new()),
            flights: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

/// Dispatches cache operations to named backends.
pub struct CacheManager {
    backends: HashMap<String, Arc<dyn CacheBackend>>,
    default_backend: String,
    initialized: AtomicBool,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
    flights: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder {
            backends: HashMap::new(),
            default_backend: "memory".to_string(),
        }
    }

    /// Start backend maintenance tasks. Idempotent: a second call is a no-op.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut maintenance = self.maintenance.lock();
        for backend in self.backends.values() {
            if let Some(handle) = backend.spawn_maintenance() {
                maintenance.push(handle);
            }
        }
        info!(
            "Cache manager initialized ({} backends, default='{}')",
            self.backends.len(),
            self.default_backend
        );
    }

    /// Stop maintenance tasks. Idempotent.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.maintenance.lock().drain(..) {
            handle.abort();
        }
        info!("Cache manager shut down");
    }

    fn resolve(&self, backend: Option<&str>) -> CacheResult<&Arc<dyn CacheBackend>> {
        let name = backend.unwrap_or(&self.default_backend);
        self.backends
            .get(name)
            .ok_or_else(|| CacheError::UnknownBackend(name.to_string()))
    }

    /// Absorb a backend failure into a neutral value.
    fn absorb<T>(op: &str, key: &str, result: CacheResult<T>, neutral: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!("Cache {} failed for '{}': {}", op, key, err);
                neutral
            }
        }
    }

    pub async fn get(&self, backend: Option<&str>, key: &str) -> Option<Vec<u8>> {
        let result = match self.resolve(backend) {
            Ok(b) => b.get(key).await,
            Err(err) => Err(err),
        };
        Self::absorb("get", key, result, None)
    }

    pub async fn set(
        &self,
        backend: Option<&str>,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> bool {
        let result = match self.resolve(backend) {
            Ok(b) => b.set(key, value, ttl_secs).await.map(|_| true),
            Err(err) => Err(err),
        };
        Self::absorb("set", key, result, false)
    }

    pub async fn delete(&self, backend: Option<&str>, key: &str) -> bool {
        let result = match self.resolve(backend) {
            Ok(b) => b.delete(key).await,
            Err(err) => Err(err),
        };
        Self::absorb("delete", key, result, false)
    }

    pub async fn exists(&self, backend: Option<&str>, key: &str) -> bool {
        let result = match self.resolve(backend) {
            Ok(b) => b.exists(key).await,
            Err(err) => Err(err),
        };
        Self::absorb("exists", key, result, false)
    }

    pub async fn invalidate_pattern(&self, backend: Option<&str>, pattern: &str) -> u64 {
        let result = match self.resolve(backend) {
            Ok(b) => b.invalidate_pattern(pattern).await,
            Err(err) => Err(err),
        };
        Self::absorb("invalidate_pattern", pattern, result, 0)
    }

    pub async fn clear(&self, backend: Option<&str>) -> bool {
        let result = match self.resolve(backend) {
            Ok(b) => b.clear().await.map(|_| true),
            Err(err) => Err(err),
        };
        Self::absorb("clear", "*", result, false)
    }

    pub async fn get_many(
        &self,
        backend: Option<&str>,
        keys: &[String],
    ) -> HashMap<String, Vec<u8>> {
        let result = match self.resolve(backend) {
            Ok(b) => b.get_many(keys).await,
            Err(err) => Err(err),
        };
        let values = Self::absorb("get_many", "[multi]", result, Vec::new());

        keys.iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect()
    }

    pub async fn set_many(
        &self,
        backend: Option<&str>,
        pairs: Vec<(String, Vec<u8>)>,
        ttl_secs: Option<u64>,
    ) -> bool {
        let result = match self.resolve(backend) {
            Ok(b) => b.set_many(pairs, ttl_secs).await.map(|_| true),
            Err(err) => Err(err),
        };
        Self::absorb("set_many", "[multi]", result, false)
    }

    pub async fn incr(
        &self,
        backend: Option<&str>,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> i64 {
        let result = self.try_incr(backend, key, amount, default, ttl_secs).await;
        Self::absorb("incr", key, result, 0)
    }

    pub async fn decr(
        &self,
        backend: Option<&str>,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> i64 {
        let result = match self.resolve(backend) {
            Ok(b) => b.decr(key, amount, default, ttl_secs).await,
            Err(err) => Err(err),
        };
        Self::absorb("decr", key, result, 0)
    }

    /// Increment without absorbing the failure.
    ///
    /// The rate limiter needs to see a counter-store outage to fall back to
    /// its in-process window; everything else should use [`Self::incr`].
    pub async fn try_incr(
        &self,
        backend: Option<&str>,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> CacheResult<i64> {
        self.resolve(backend)?
            .incr(key, amount, default, ttl_secs)
            .await
    }

    /// Fetch and deserialize a cached JSON value. Misses, expired entries,
    /// backend failures and deserialization failures all read as `None`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        backend: Option<&str>,
        key: &str,
    ) -> Option<T> {
        let bytes = self.get(backend, key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Cached value at '{}' failed to deserialize: {}", key, err);
                None
            }
        }
    }

    /// Serialize and store a JSON value.
    pub async fn set_json<T: Serialize>(
        &self,
        backend: Option<&str>,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(backend, key, bytes, ttl_secs).await,
            Err(err) => {
                warn!("Value for '{}' failed to serialize: {}", key, err);
                false
            }
        }
    }

    /// Get-or-compute with per-key single-flight.
    ///
    /// On a miss, concurrent callers for the same key collapse onto one
    /// compute; the rest await it and re-read the cache. The collapse is
    /// process-local only: two processes missing simultaneously still both
    /// compute. Values serializing to JSON `null` are not cached unless
    /// [`ComputeOptions::cache_null`] is set. Compute errors propagate
    /// unchanged and cache nothing.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        backend: Option<&str>,
        key: &str,
        opts: &ComputeOptions,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_json::<T>(backend, key).await {
            debug!("get_or_compute hit key={}", key);
            return Ok(hit);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = flight.lock().await;

            // A concurrent flight may have filled the cache while we waited
            match self.get_json::<T>(backend, key).await {
                Some(hit) => Ok(hit),
                None => {
                    debug!("get_or_compute miss key={}", key);
                    let computed = compute().await;
                    if let Ok(value) = &computed {
                        match serde_json::to_vec(value) {
                            Ok(bytes) => {
                                if opts.cache_null || bytes != b"null" {
                                    self.set(backend, key, bytes, opts.ttl_secs).await;
                                }
                            }
                            Err(err) => {
                                warn!("Computed value for '{}' failed to serialize: {}", key, err);
                            }
                        }
                    }
                    computed
                }
            }
        };

        // Drop the flight entry once no other caller holds it
        let mut flights = self.flights.lock().await;
        if let Some(entry) = flights.get(key) {
            if Arc::strong_count(entry) <= 2 {
                flights.remove(key);
            }
        }

        result
    }
}
