//! Tests against a live Redis on 127.0.0.1:6379.
//!
//! Run with `cargo test --features redis-tests`. Each test works under its
//! own key prefix and cleans up after itself.
#![cfg(feature = "redis-tests")]

use std::sync::Arc;
use uuid::Uuid;

use quire_core::{CacheBackend, RedisCache};

const REDIS_URL: &str = "redis://127.0.0.1:6379/0";

async fn cache() -> RedisCache {
    let prefix = format!("quire-test:{}:", Uuid::new_v4());
    RedisCache::connect(REDIS_URL, prefix)
        .await
        .expect("redis must be running for redis-tests")
}

#[tokio::test]
async fn test_set_get_delete() {
    let cache = cache().await;

    cache.set("part:1", b"bolt".to_vec(), Some(60)).await.unwrap();
    assert_eq!(cache.get("part:1").await.unwrap(), Some(b"bolt".to_vec()));
    assert!(cache.exists("part:1").await.unwrap());

    assert!(cache.delete("part:1").await.unwrap());
    assert_eq!(cache.get("part:1").await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_incr_is_exact() {
    let cache = Arc::new(cache().await);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.incr("hits", 1, 0, Some(60)).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.incr("hits", 0, 0, Some(60)).await.unwrap(), 50);
    cache.delete("hits").await.unwrap();
}

#[tokio::test]
async fn test_incr_seeds_default_and_expires() {
    let cache = cache().await;

    assert_eq!(cache.incr("counter", 1, 100, Some(1)).await.unwrap(), 101);

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert_eq!(cache.get("counter").await.unwrap(), None);
}

#[tokio::test]
async fn test_pattern_invalidation_and_scoped_clear() {
    let cache = cache().await;

    cache
        .set_many(
            vec![
                ("parts:1".to_string(), b"a".to_vec()),
                ("parts:2".to_string(), b"b".to_vec()),
                ("brands:1".to_string(), b"c".to_vec()),
            ],
            Some(60),
        )
        .await
        .unwrap();

    assert_eq!(cache.invalidate_pattern("parts:*").await.unwrap(), 2);
    assert_eq!(cache.get("brands:1").await.unwrap(), Some(b"c".to_vec()));

    cache.clear().await.unwrap();
    assert_eq!(cache.get("brands:1").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_many_preserves_order() {
    let cache = cache().await;

    cache.set("a", b"1".to_vec(), Some(60)).await.unwrap();
    cache.set("c", b"3".to_vec(), Some(60)).await.unwrap();

    let values = cache
        .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await
        .unwrap();
    assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);

    cache.clear().await.unwrap();
}
