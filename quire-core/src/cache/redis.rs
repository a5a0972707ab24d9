//! Redis-backed cache backend.
//!
//! All keys are namespaced under a configured prefix so `clear` and pattern
//! invalidation stay scoped to this application's slice of a possibly shared
//! database (never FLUSHDB). Counter increments ride INCRBY, the one
//! operation whose atomicity the rate limiter depends on.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::CacheBackend;
use crate::core::error::{CacheError, CacheResult};

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Distributed [`CacheBackend`] over a Redis-compatible server.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`), namespacing every
    /// key under `key_prefix`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let conn = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();

        info!("Connected Redis cache backend (prefix='{}')", key_prefix);
        Ok(Self { conn, key_prefix })
    }

    fn k(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn delete_matching(&self, raw_pattern: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();

        let mut matching: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(raw_pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            matching.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if matching.is_empty() {
            return Ok(0);
        }

        let removed: u64 = conn.del(&matching).await?;
        debug!("Invalidated {} keys matching '{}'", removed, raw_pattern);
        Ok(removed)
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.k(key)).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        match ttl_secs {
            Some(secs) => conn.set_ex::<_, _, ()>(self.k(key), value, secs).await?,
            None => conn.set::<_, _, ()>(self.k(key), value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(self.k(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(self.k(key)).await?)
    }

    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.delete_matching(&self.k(pattern)).await
    }

    async fn clear(&self) -> CacheResult<()> {
        // Only this backend's namespace, not the whole database
        self.delete_matching(&format!("{}*", self.key_prefix))
            .await?;
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let prefixed: Vec<String> = keys.iter().map(|key| self.k(key)).collect();
        let mut conn = self.conn.clone();
        Ok(conn.mget(&prefixed).await?)
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Vec<u8>)>,
        ttl_secs: Option<u64>,
    ) -> CacheResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in pairs {
            match ttl_secs {
                Some(secs) => pipe.set_ex(self.k(&key), value, secs).ignore(),
                None => pipe.set(self.k(&key), value).ignore(),
            };
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn incr(
        &self,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> CacheResult<i64> {
        let k = self.k(key);
        let mut conn = self.conn.clone();

        if default != 0 {
            // Seed an absent counter; NX keeps this race-free
            let _: Option<String> = redis::cmd("SET")
                .arg(&k)
                .arg(default)
                .arg("NX")
                .query_async(&mut conn)
                .await?;
        }

        let value: i64 = conn.incr(&k, amount).await?;

        // Attach the TTL only when this call created the counter. A racing
        // creator may refresh an existing TTL; for window counters that is
        // harmless.
        if let Some(secs) = ttl_secs {
            if value == default + amount {
                let _: bool = conn.expire(&k, secs as i64).await?;
            }
        }

        Ok(value)
    }
}
