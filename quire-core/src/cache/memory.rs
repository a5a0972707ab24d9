//! Process-local cache backend.
//!
//! Radix-trie keyed map with lazy TTL eviction on read plus a background
//! sweeper. State is lost on restart; that is acceptable for everything this
//! backend is used for (cached pages, rate-limit windows).

use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{CacheBackend, glob_match};
use crate::clock::{Clock, SystemClock};
use crate::core::error::{CacheError, CacheResult};

/// Cached entry with its expiry in clock time.
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn new(data: Vec<u8>, ttl_secs: Option<u64>, now_ms: u64) -> Self {
        Self {
            data,
            expires_at_ms: ttl_secs.map(|secs| now_ms + secs * 1000),
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expires| now_ms >= expires)
    }
}

/// Configuration for the in-memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// TTL sweeper interval in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
        }
    }
}

/// Operation counters.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub gets: u64,
    pub sets: u64,
    pub dels: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory [`CacheBackend`] over a radix trie.
#[derive(Clone)]
pub struct MemoryCache {
    data: Arc<RwLock<Trie<String, Entry>>>,
    stats: Arc<RwLock<CacheStats>>,
    clock: Arc<dyn Clock>,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an injected clock; tests drive TTL without sleeping.
    pub fn with_clock(config: MemoryCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            clock,
            config,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    fn sweep_expired(&self) {
        let now_ms = self.clock.now_millis();
        let mut data = self.data.write();

        let expired: Vec<String> = data
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            debug!("Sweeping {} expired cache keys", expired.len());
            for key in &expired {
                data.remove(key);
            }
            let mut stats = self.stats.write();
            stats.total_keys = stats.total_keys.saturating_sub(expired.len());
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now_ms = self.clock.now_millis();
        let mut data = self.data.write();
        let mut stats = self.stats.write();
        stats.gets += 1;

        let expired = match data.get(key) {
            Some(entry) => entry.is_expired(now_ms),
            None => {
                stats.misses += 1;
                return Ok(None);
            }
        };

        if expired {
            debug!("Cache key expired: {}", key);
            data.remove(key);
            stats.misses += 1;
            stats.total_keys = stats.total_keys.saturating_sub(1);
            return Ok(None);
        }

        stats.hits += 1;
        Ok(data.get(key).map(|entry| entry.data.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> CacheResult<()> {
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl_secs);

        let entry = Entry::new(value, ttl_secs, self.clock.now_millis());
        let mut data = self.data.write();
        let is_new = data.insert(key.to_string(), entry).is_none();

        let mut stats = self.stats.write();
        stats.sets += 1;
        if is_new {
            stats.total_keys += 1;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed = self.data.write().remove(key).is_some();
        if removed {
            let mut stats = self.stats.write();
            stats.dels += 1;
            stats.total_keys = stats.total_keys.saturating_sub(1);
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now_ms = self.clock.now_millis();
        let data = self.data.read();
        Ok(data.get(key).is_some_and(|entry| !entry.is_expired(now_ms)))
    }

    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut data = self.data.write();

        // `prefix*` patterns take the trie descendant fast path
        let matching: Vec<String> = match pattern.strip_suffix('*') {
            Some(prefix) if !prefix.contains(['*', '?']) => data
                .get_raw_descendant(prefix)
                .map(|subtrie| subtrie.keys().map(|k| k.to_string()).collect())
                .unwrap_or_default(),
            _ => data
                .keys()
                .filter(|key| glob_match(pattern, key))
                .map(|k| k.to_string())
                .collect(),
        };

        for key in &matching {
            data.remove(key);
        }

        let count = matching.len() as u64;
        if count > 0 {
            debug!("Invalidated {} keys matching '{}'", count, pattern);
            let mut stats = self.stats.write();
            stats.dels += count;
            stats.total_keys = stats.total_keys.saturating_sub(matching.len());
        }
        Ok(count)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut data = self.data.write();
        *data = Trie::new();
        self.stats.write().total_keys = 0;
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Vec<u8>)>,
        ttl_secs: Option<u64>,
    ) -> CacheResult<()> {
        for (key, value) in pairs {
            self.set(&key, value, ttl_secs).await?;
        }
        Ok(())
    }

    async fn incr(
        &self,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> CacheResult<i64> {
        let now_ms = self.clock.now_millis();

        // Read-modify-write under one write lock; concurrent callers
        // serialize here, so no updates are lost.
        let mut data = self.data.write();

        let existing = data.get(key).filter(|entry| !entry.is_expired(now_ms));
        let (current, expires_at_ms) = match existing {
            Some(entry) => {
                let parsed = std::str::from_utf8(&entry.data)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(CacheError::NotAnInteger)?;
                (parsed, entry.expires_at_ms)
            }
            // Fresh counter: seed from default, attach the TTL
            None => (default, ttl_secs.map(|secs| now_ms + secs * 1000)),
        };

        let new_value = current + amount;
        let is_new = data
            .insert(
                key.to_string(),
                Entry {
                    data: new_value.to_string().into_bytes(),
                    expires_at_ms,
                },
            )
            .is_none();

        let mut stats = self.stats.write();
        stats.sets += 1;
        if is_new {
            stats.total_keys += 1;
        }
        Ok(new_value)
    }

    fn spawn_maintenance(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval_ms = self.config.sweep_interval_ms;
        info!("Starting cache TTL sweeper (interval={}ms)", interval_ms);

        let cache = self.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                cache.sweep_expired();
            }
        }))
    }
}
