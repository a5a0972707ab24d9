use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quire_core::{
    CacheManager, ComputeOptions, ManualClock, MemoryCache, MemoryCacheConfig,
};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn manager_with_clock(clock: Arc<ManualClock>) -> Arc<CacheManager> {
    Arc::new(
        CacheManager::builder()
            .backend(
                "memory",
                Arc::new(MemoryCache::with_clock(
                    MemoryCacheConfig::default(),
                    clock,
                )),
            )
            .default_backend("memory")
            .build(),
    )
}

fn manager() -> Arc<CacheManager> {
    manager_with_clock(ManualClock::new(1_000_000))
}

#[tokio::test]
async fn test_set_get_delete_exists() {
    let cache = manager();

    assert!(cache.set(None, "part:1", b"bolt".to_vec(), None).await);
    assert!(cache.exists(None, "part:1").await);
    assert_eq!(cache.get(None, "part:1").await, Some(b"bolt".to_vec()));

    assert!(cache.delete(None, "part:1").await);
    assert!(!cache.exists(None, "part:1").await);
    assert_eq!(cache.get(None, "part:1").await, None);
}

#[tokio::test]
async fn test_ttl_elapses_on_simulated_clock() {
    let clock = ManualClock::new(1_000_000);
    let cache = manager_with_clock(clock.clone());

    cache.set(None, "part:1", b"bolt".to_vec(), Some(120)).await;
    assert_eq!(cache.get(None, "part:1").await, Some(b"bolt".to_vec()));

    clock.advance_secs(119);
    assert_eq!(cache.get(None, "part:1").await, Some(b"bolt".to_vec()));

    clock.advance_secs(2);
    assert_eq!(cache.get(None, "part:1").await, None);
}

#[tokio::test]
async fn test_pattern_invalidation_through_manager() {
    let cache = manager();

    cache.set(None, "parts:page:1", b"a".to_vec(), None).await;
    cache.set(None, "parts:page:2", b"b".to_vec(), None).await;
    cache.set(None, "brands:page:1", b"c".to_vec(), None).await;

    assert_eq!(cache.invalidate_pattern(None, "parts:*").await, 2);
    assert_eq!(cache.get(None, "parts:page:1").await, None);
    assert_eq!(cache.get(None, "brands:page:1").await, Some(b"c".to_vec()));
}

#[tokio::test]
async fn test_bulk_ops() {
    let cache = manager();

    assert!(
        cache
            .set_many(
                None,
                vec![
                    ("a".to_string(), b"1".to_vec()),
                    ("b".to_string(), b"2".to_vec()),
                ],
                Some(60),
            )
            .await
    );

    let found = cache
        .get_many(None, &["a".to_string(), "b".to_string(), "c".to_string()])
        .await;
    assert_eq!(found.len(), 2);
    assert_eq!(found["b"], b"2".to_vec());
}

#[tokio::test]
async fn test_concurrent_incr_is_exact() {
    let cache = manager();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.incr(None, "hits", 1, 0, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.incr(None, "hits", 0, 0, None).await, 100);
}

#[tokio::test]
async fn test_clear_empties_backend() {
    let cache = manager();
    cache.set(None, "a", b"1".to_vec(), None).await;
    cache.set(None, "b", b"2".to_vec(), None).await;

    assert!(cache.clear(None).await);
    assert_eq!(cache.get(None, "a").await, None);
    assert_eq!(cache.get(None, "b").await, None);
}

#[tokio::test]
async fn test_get_or_compute_collapses_concurrent_misses() {
    let cache = manager();
    let computes = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let computes = computes.clone();
        handles.push(tokio::spawn(async move {
            let value: Result<String, std::convert::Infallible> = cache
                .get_or_compute(
                    None,
                    "catalog:landing",
                    &ComputeOptions {
                        ttl_secs: Some(60),
                        cache_null: false,
                    },
                    || async {
                        computes.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok("landing-page".to_string())
                    },
                )
                .await;
            value.unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "landing-page");
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lifecycle_sweeper_removes_expired_keys() {
    init_tracing();
    let clock = ManualClock::new(1_000_000);
    let cache = manager_with_clock(clock.clone());

    cache.initialize();
    cache.set(None, "short", b"x".to_vec(), Some(1)).await;
    clock.advance_secs(2);

    // The sweeper runs every 100ms of real time
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(cache.get(None, "short").await, None);

    cache.shutdown();
}
