//! Redis-backed cache store

use super::{CacheStore, Result, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::info;

/// Cache store backed by a Redis server
///
/// Uses a multiplexed [`ConnectionManager`] that reconnects on its own, so a
/// single instance is shared by every engine task.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers `PING` within `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(map_redis_error)?;

        let store = Self { conn };

        tokio::time::timeout(timeout, store.ping())
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        info!(url = %redact(url), "Connected to Redis");
        Ok(store)
    }

    /// Build a `redis://` URL from host, port and optional password
    pub fn url_for(host: &str, port: u16, password: Option<&str>) -> String {
        match password {
            Some(pw) if !pw.is_empty() => format!("redis://:{}@{}:{}/0", pw, host, port),
            _ => format!("redis://{}:{}/0", host, port),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(map_redis_error)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys::<_, Vec<String>>(pattern)
            .await
            .map_err(map_redis_error)
    }

    async fn memory_usage(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        redis::cmd("MEMORY")
            .arg("USAGE")
            .arg(key)
            .query_async::<_, Option<u64>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_redis_error)
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
