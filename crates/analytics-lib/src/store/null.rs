use super::{CacheStore, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Store used when no cache is configured; every call is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl CacheStore for NullStore {
    fn is_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn memory_usage(&self, _key: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
