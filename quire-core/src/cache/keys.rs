//! Cache key derivation.
//!
//! Keys are `{namespace}:{identity}:{fingerprint}` where the fingerprint is
//! a truncated SHA-256 of the canonical JSON of the call arguments. The
//! explicit equivalent of wrapping a function in a caching decorator: the
//! caller names the call site, the arguments name the variant.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of the hex-encoded argument fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Builds namespaced cache keys from call identity plus arguments.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Key for `identity` called with `args`.
    pub fn key<A: Serialize>(&self, identity: &str, args: &A) -> String {
        let canonical = serde_json::to_vec(args).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut fingerprint = hex::encode(digest);
        fingerprint.truncate(FINGERPRINT_LEN);

        format!("{}:{}:{}", self.namespace, identity, fingerprint)
    }

    /// Glob pattern covering every variant of one call site, for
    /// invalidation after a write.
    pub fn pattern(&self, identity: &str) -> String {
        format!("{}:{}:*", self.namespace, identity)
    }
}
