//! Cached pagination.
//!
//! Wraps the paginators in [`CacheManager::get_or_compute`], keyed by the
//! source's fingerprint plus the request parameters. A cache outage degrades
//! to direct pagination; pagination errors pass through untouched.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::keys::CacheKeyBuilder;
use super::manager::{CacheManager, ComputeOptions};
use crate::core::error::PageResult;
use crate::core::paginator::{CursorPaginator, CursorParams, OffsetPaginator, OffsetParams, Page};
use crate::core::query::QuerySource;
use crate::core::sort::FieldRegistry;

/// Pagination results served through the cache.
pub struct PaginationCache {
    cache: Arc<CacheManager>,
    keys: CacheKeyBuilder,
    backend: Option<String>,
    ttl_secs: Option<u64>,
}

impl PaginationCache {
    pub fn new(
        cache: Arc<CacheManager>,
        namespace: impl Into<String>,
        backend: Option<String>,
        ttl_secs: Option<u64>,
    ) -> Self {
        Self {
            cache,
            keys: CacheKeyBuilder::new(namespace),
            backend,
            ttl_secs,
        }
    }

    fn opts(&self) -> ComputeOptions {
        ComputeOptions {
            ttl_secs: self.ttl_secs,
            cache_null: false,
        }
    }

    /// Offset pagination through the cache. `fingerprint` names the query
    /// (entity + filters); two sources with equal fingerprints must produce
    /// equal results.
    pub async fn offset<T, S>(
        &self,
        fingerprint: &str,
        paginator: &OffsetPaginator,
        source: &S,
        registry: &FieldRegistry<T>,
        params: &OffsetParams,
    ) -> PageResult<Page<T>>
    where
        T: Serialize + DeserializeOwned,
        S: QuerySource<T> + ?Sized,
    {
        let key = self.keys.key(fingerprint, &("offset", params));
        self.cache
            .get_or_compute(self.backend.as_deref(), &key, &self.opts(), || {
                paginator.paginate(source, registry, params)
            })
            .await
    }

    /// Cursor pagination through the cache.
    pub async fn cursor<T, S>(
        &self,
        fingerprint: &str,
        paginator: &CursorPaginator,
        source: &S,
        registry: &FieldRegistry<T>,
        params: &CursorParams,
    ) -> PageResult<Page<T>>
    where
        T: Serialize + DeserializeOwned,
        S: QuerySource<T> + ?Sized,
    {
        let key = self.keys.key(fingerprint, &("cursor", params));
        self.cache
            .get_or_compute(self.backend.as_deref(), &key, &self.opts(), || {
                paginator.paginate(source, registry, params)
            })
            .await
    }

    /// Drop every cached page of one query, after the underlying data
    /// changes.
    pub async fn invalidate(&self, fingerprint: &str) -> u64 {
        self.cache
            .invalidate_pattern(self.backend.as_deref(), &self.keys.pattern(fingerprint))
            .await
    }
}
