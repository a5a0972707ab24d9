//! Request rate limiting.
//!
//! Sliding-window counting with:
//! - Per-IP, per-user, or combined keying (selected by the rule)
//! - A distributed counter through the cache manager, shared across
//!   processes
//! - An in-process fallback window when the counter store is unreachable
//!
//! The limiter fails open: a counter-store outage means requests proceed
//! (possibly under-throttled) rather than being wrongly rejected. Both
//! window implementations are bucketed approximations of a true sliding
//! window: the distributed side resets at fixed window boundaries, the
//! in-process side buckets per second.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::clock::Clock;

/// How the limit key is derived from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStrategy {
    #[default]
    Ip,
    User,
    Combined,
}

/// One rate-limit rule, typically configured per route group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub strategy: LimitStrategy,
}

/// Caller identity a request was attributed to.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub ip: Option<String>,
    pub user_id: Option<String>,
}

impl RequestIdentity {
    pub fn ip(addr: impl Into<String>) -> Self {
        Self {
            ip: Some(addr.into()),
            user_id: None,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            ip: None,
            user_id: Some(id.into()),
        }
    }
}

/// Rate limit check result with metadata for response headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request exceeded the rule
    pub limited: bool,
    /// Requests counted in the current window, this one included
    pub current: u64,
    /// Requests allowed per window
    pub limit: u64,
    /// Time until the current window resets
    pub reset_in: Duration,
}

/// In-process windows: key to (second bucket, count) buckets.
///
/// Each check prunes the key's buckets to the window and sums what remains,
/// so a check costs O(populated buckets), bounded by `window_seconds`.
/// Acceptable at the request rates this fallback serves; it is not the hot
/// path.
type LocalWindows = HashMap<String, HashMap<u64, u64>>;

/// Sliding-window rate limiter.
pub struct RateLimiter {
    cache: Arc<CacheManager>,
    backend: Option<String>,
    clock: Arc<dyn Clock>,
    local: Mutex<LocalWindows>,
    degraded: AtomicBool,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheManager>, backend: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            backend,
            clock,
            local: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Count this request against the rule and decide whether to reject it.
    ///
    /// Never returns an error: backend trouble falls back to the in-process
    /// window for this call.
    pub async fn check(&self, identity: &RequestIdentity, rule: &RateLimitRule) -> RateLimitDecision {
        let window_seconds = rule.window_seconds.max(1);
        let key = Self::derive_key(identity, rule.strategy);
        let now = self.clock.now_secs();
        let window = now / window_seconds;
        let window_key = format!("ratelimit:{}:{}", key, window);

        let current = match self
            .cache
            .try_incr(
                self.backend.as_deref(),
                &window_key,
                1,
                0,
                Some(window_seconds),
            )
            .await
        {
            Ok(count) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("Rate limit counter store recovered");
                }
                count.max(0) as u64
            }
            Err(err) => {
                // Log the outage once per transition, not per request
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(
                        "Rate limit counter store unavailable, using in-process window: {}",
                        err
                    );
                }
                self.check_local(&key, window_seconds, now)
            }
        };

        let limited = current > rule.requests_per_window;
        if limited {
            warn!(
                "Rate limit exceeded for {}: {}/{} in {}s window",
                key, current, rule.requests_per_window, window_seconds
            );
        }

        RateLimitDecision {
            limited,
            current,
            limit: rule.requests_per_window,
            reset_in: Duration::from_secs(window_seconds - (now % window_seconds)),
        }
    }

    /// Prune, count this call, and sum the key's window under one lock, so
    /// concurrent checks on the same key cannot lose counts.
    fn check_local(&self, key: &str, window_seconds: u64, now: u64) -> u64 {
        let floor = now.saturating_sub(window_seconds - 1);
        let mut windows = self.local.lock();

        let buckets = windows.entry(key.to_string()).or_default();
        buckets.retain(|second, _| *second >= floor);
        *buckets.entry(now).or_insert(0) += 1;
        buckets.values().sum()
    }

    /// Drop in-process state for callers idle longer than `idle_seconds`.
    /// Run periodically; the distributed side self-expires via TTL.
    pub fn cleanup(&self, idle_seconds: u64) {
        let floor = self.clock.now_secs().saturating_sub(idle_seconds);
        let mut windows = self.local.lock();
        windows.retain(|_, buckets| buckets.keys().any(|second| *second >= floor));
    }

    fn derive_key(identity: &RequestIdentity, strategy: LimitStrategy) -> String {
        let ip = identity.ip.as_deref().unwrap_or("unknown");
        let user = identity.user_id.as_deref().unwrap_or("unknown");
        match strategy {
            LimitStrategy::Ip => format!("ip:{}", ip),
            LimitStrategy::User => format!("user:{}", user),
            LimitStrategy::Combined => format!("user:{}:ip:{}", user, ip),
        }
    }
}
