//! In-process cache with expiring keys

use super::{glob_match, CacheStore, Result, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Concurrent map honouring per-key TTLs
///
/// Survives engine restarts within one process, which makes it useful for
/// memory-only deployments and for exercising checkpoint/restore.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the cache going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Expired; the read guard is released by now
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let now = Instant::now();
        self.entries.retain(|_, e| e.is_live(now));

        Ok(self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn memory_usage(&self, key: &str) -> Result<Option<u64>> {
        self.check_available()?;
        let now = Instant::now();

        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| (key.len() + e.value.len()) as u64))
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store
            .set("analytics:stats", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("analytics:stats").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let store = MemoryStore::new();
        store.set("short", "1", Duration::ZERO).await.unwrap();
        store.set("long", "2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.keys("*").await.unwrap(), vec!["long".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_pattern_and_memory_usage() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("anomaly:1", "abc", ttl).await.unwrap();
        store.set("anomaly:2", "abcd", ttl).await.unwrap();
        store.set("metric:d:1", "x", ttl).await.unwrap();

        let mut keys = store.keys("anomaly:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["anomaly:1", "anomaly:2"]);

        assert_eq!(store.memory_usage("anomaly:1").await.unwrap(), Some(12));
        assert_eq!(store.memory_usage("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        tokio_test::assert_ok!(store.ping().await);
    }
}
