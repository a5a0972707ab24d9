use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::ratelimit::{LimitStrategy, RateLimitRule};

/// Top-level configuration for the list-serving core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend name list endpoints use unless they pick one explicitly
    pub default_backend: String,
    /// Namespace prefix for keys in shared stores
    pub key_prefix: String,
    /// TTL sweeper interval for the in-memory backend, milliseconds
    pub sweep_interval_ms: u64,
    /// TTL applied to cached pages
    pub page_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub strategy: LimitStrategy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                default_backend: "memory".to_string(),
                key_prefix: "quire:".to_string(),
                sweep_interval_ms: 100,
                page_ttl_secs: Some(300),
            },
            pagination: PaginationConfig {
                default_page_size: 20,
                max_page_size: 100,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_window: 120,
                window_seconds: 60,
                strategy: LimitStrategy::Ip,
            },
        }
    }
}

impl CoreConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CoreConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

impl RateLimitConfig {
    /// Convert to the rule applied per request
    pub fn to_rule(&self) -> RateLimitRule {
        RateLimitRule {
            requests_per_window: self.requests_per_window,
            window_seconds: self.window_seconds,
            strategy: self.strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.cache.default_backend, "memory");
        assert_eq!(config.pagination.max_page_size, 100);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
cache:
  default_backend: redis
  key_prefix: "catalog:"
  sweep_interval_ms: 250
  page_ttl_secs: 120
pagination:
  default_page_size: 25
  max_page_size: 200
rate_limit:
  enabled: true
  requests_per_window: 30
  window_seconds: 60
  strategy: combined
"#;
        let config: CoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache.default_backend, "redis");
        assert_eq!(config.pagination.max_page_size, 200);

        let rule = config.rate_limit.to_rule();
        assert_eq!(rule.requests_per_window, 30);
        assert_eq!(rule.strategy, LimitStrategy::Combined);
    }
}
