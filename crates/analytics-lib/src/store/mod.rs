//! External key-value cache used for checkpoints and anomaly records
//!
//! The engine talks to the cache through the [`CacheStore`] trait so the
//! backend is chosen once at construction:
//! - [`RedisStore`] for a networked Redis instance
//! - [`MemoryStore`] for an in-process map with expiring keys
//! - [`NullStore`] when no cache is configured (memory-only operation)

mod memory;
mod null;
mod redis_store;

pub use memory::MemoryStore;
pub use null::NullStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by cache backends
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key-value cache with expiring keys
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether this store actually persists anything
    fn is_enabled(&self) -> bool {
        true
    }

    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Enumerate keys matching a glob pattern (`*` wildcards)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Approximate bytes used by a key, `None` if the key is gone
    async fn memory_usage(&self, key: &str) -> Result<Option<u64>>;

    async fn ping(&self) -> Result<()>;
}

/// Match `key` against a glob pattern supporting only `*`
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*", ""));
        assert!(glob_match("anomaly:*", "anomaly:1700000000123"));
        assert!(!glob_match("anomaly:*", "metric:dev:1"));
        assert!(glob_match("metric:*:17*", "metric:dev-1:1700"));
        assert!(!glob_match("metric:*:17*", "metric:dev-1:1600"));
        assert!(glob_match("analytics:stats", "analytics:stats"));
        assert!(!glob_match("analytics:stats", "analytics:window"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "cache unavailable: connection refused");

        let err = StoreError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "cache operation timed out after 2s");
    }
}
