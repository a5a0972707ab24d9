//! Cache layer: backend trait, implementations, manager, key derivation.

pub mod keys;
pub mod manager;
pub mod memory;
pub mod paged;
pub mod redis;

use async_trait::async_trait;

use crate::core::error::CacheResult;

pub use keys::CacheKeyBuilder;
pub use manager::{CacheManager, CacheManagerBuilder, ComputeOptions};
pub use memory::{CacheStats, MemoryCache, MemoryCacheConfig};
pub use paged::PaginationCache;
pub use self::redis::RedisCache;

/// Storage engine behind the cache manager.
///
/// Values are opaque bytes; TTLs are seconds. Implementations map their
/// transport failures into [`crate::core::error::CacheError`]; the manager
/// is what absorbs them. `incr`/`decr` must be atomic at the backend (a
/// single-round-trip increment, never read-then-write): concurrent counters
/// are the one operation where correctness, not just performance, depends on
/// the implementation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remove every key matching a glob pattern (`*` and `?`); returns the
    /// number of keys removed.
    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64>;

    async fn clear(&self) -> CacheResult<()>;

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>>;

    async fn set_many(
        &self,
        pairs: Vec<(String, Vec<u8>)>,
        ttl_secs: Option<u64>,
    ) -> CacheResult<()>;

    /// Atomically add `amount` to the counter at `key`, seeding an absent or
    /// expired counter from `default` and attaching `ttl_secs` to it.
    async fn incr(
        &self,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> CacheResult<i64>;

    async fn decr(
        &self,
        key: &str,
        amount: i64,
        default: i64,
        ttl_secs: Option<u64>,
    ) -> CacheResult<i64> {
        self.incr(key, -amount, default, ttl_secs).await
    }

    /// Spawn any background maintenance (TTL sweepers). Returns a handle the
    /// manager aborts on shutdown.
    fn spawn_maintenance(&self) -> Option<tokio::task::JoinHandle<()>> {
        None
    }
}

/// Minimal glob matching: `*` matches any run of characters, `?` exactly one.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, k));
            p += 1;
        } else if let Some((sp, sk)) = star {
            // Backtrack: let the last `*` swallow one more character
            p = sp + 1;
            k = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn test_glob_literal() {
        assert!(glob_match("product:1", "product:1"));
        assert!(!glob_match("product:1", "product:2"));
    }

    #[test]
    fn test_glob_star() {
        assert!(glob_match("product:*", "product:1"));
        assert!(glob_match("product:*", "product:"));
        assert!(glob_match("*:1", "product:1"));
        assert!(glob_match("product:*:detail", "product:42:detail"));
        assert!(!glob_match("product:*", "order:1"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(glob_match("page:?", "page:1"));
        assert!(!glob_match("page:?", "page:12"));
    }

    #[test]
    fn test_glob_star_backtracking() {
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(!glob_match("a*b*c", "a-x-c"));
    }
}
