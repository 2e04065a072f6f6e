//! Checkpointing of engine state to the external cache
//!
//! All operations are best-effort: failures and timeouts are logged and
//! absorbed here so that nothing from the cache reaches producers or the
//! query surface.

use crate::models::{AnomalyRecord, Observation};
use crate::store::{CacheStore, StoreError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const STATS_KEY: &str = "analytics:stats";
pub const WINDOW_KEY: &str = "analytics:window";
pub const ROLLING_AVG_KEY: &str = "analytics:rolling_avg";
pub const ANOMALY_KEY_PATTERN: &str = "anomaly:*";

/// Key for the audit copy of a raw observation
pub fn metric_key(observation: &Observation) -> String {
    format!(
        "metric:{}:{}",
        observation.device_id,
        observation.timestamp.timestamp()
    )
}

/// Key for an anomaly record, unique per detection instant
pub fn anomaly_key(record: &AnomalyRecord) -> String {
    let nanos = record
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| record.timestamp.timestamp_micros().saturating_mul(1000));
    format!("anomaly:{}", nanos)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredStats {
    anomaly_count: u64,
    total_processed: u64,
}

/// Consistent copy of the aggregate state taken under the shared lock
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub total_processed: u64,
    pub anomaly_count: u64,
    pub rolling_average: f64,
    pub window: Vec<Observation>,
}

/// State recovered from the cache at startup
///
/// Absent or unparseable keys leave the corresponding fields at their
/// empty defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredState {
    pub total_processed: u64,
    pub anomaly_count: u64,
    pub window: Vec<Observation>,
}

impl RestoredState {
    pub fn is_empty(&self) -> bool {
        self.total_processed == 0 && self.anomaly_count == 0 && self.window.is_empty()
    }
}

/// Best-effort adapter between the engine and a [`CacheStore`]
pub struct Persistence {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    op_timeout: Duration,
}

impl Persistence {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            op_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Run one store call under the operation timeout, logging failures
    async fn call<T, F>(&self, operation: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    backend = self.store.name(),
                    operation = operation,
                    key = %key,
                    error = %e,
                    "Cache operation failed"
                );
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        self.call("set", key, self.store.set(key, value, self.ttl))
            .await
            .is_some()
    }

    /// Read the last checkpoint, falling back to empty state
    pub async fn restore(&self) -> RestoredState {
        let mut restored = RestoredState::default();
        if !self.is_enabled() {
            return restored;
        }

        if let Some(Some(raw)) = self.call("get", STATS_KEY, self.store.get(STATS_KEY)).await {
            match serde_json::from_str::<StoredStats>(&raw) {
                Ok(stats) => {
                    restored.total_processed = stats.total_processed;
                    restored.anomaly_count = stats.anomaly_count;
                }
                Err(e) => warn!(key = STATS_KEY, error = %e, "Ignoring unparseable checkpoint"),
            }
        }

        if let Some(Some(raw)) = self.call("get", WINDOW_KEY, self.store.get(WINDOW_KEY)).await {
            match serde_json::from_str::<Vec<Observation>>(&raw) {
                Ok(window) => restored.window = window,
                Err(e) => warn!(key = WINDOW_KEY, error = %e, "Ignoring unparseable checkpoint"),
            }
        }

        restored
    }

    /// Overwrite the checkpoint keys; returns true if every write landed
    pub async fn snapshot(&self, checkpoint: &Checkpoint) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let stats = StoredStats {
            anomaly_count: checkpoint.anomaly_count,
            total_processed: checkpoint.total_processed,
        };

        let mut ok = true;

        match serde_json::to_string(&stats) {
            Ok(json) => ok &= self.put(STATS_KEY, &json).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize stats checkpoint");
                ok = false;
            }
        }

        match serde_json::to_string(&checkpoint.window) {
            Ok(json) => ok &= self.put(WINDOW_KEY, &json).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize window checkpoint");
                ok = false;
            }
        }

        match serde_json::to_string(&checkpoint.rolling_average) {
            Ok(json) => ok &= self.put(ROLLING_AVG_KEY, &json).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize rolling average");
                ok = false;
            }
        }

        if ok {
            debug!(
                total_processed = checkpoint.total_processed,
                window_len = checkpoint.window.len(),
                "Checkpoint written"
            );
        }
        ok
    }

    /// Store one anomaly record under its own expiring key
    pub async fn record_anomaly(&self, record: &AnomalyRecord) -> bool {
        if !self.is_enabled() {
            return false;
        }

        match serde_json::to_string(record) {
            Ok(json) => self.put(&anomaly_key(record), &json).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize anomaly record");
                false
            }
        }
    }

    /// Store the audit copy of a raw observation
    pub async fn audit(&self, observation: &Observation) -> bool {
        if !self.is_enabled() {
            return false;
        }

        match serde_json::to_string(observation) {
            Ok(json) => self.put(&metric_key(observation), &json).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize observation");
                false
            }
        }
    }

    /// Up to `limit` anomaly records in whatever order the store lists them
    pub async fn recent_anomalies(&self, limit: usize) -> Vec<AnomalyRecord> {
        if !self.is_enabled() || limit == 0 {
            return Vec::new();
        }

        let keys = match self
            .call("keys", ANOMALY_KEY_PATTERN, self.store.keys(ANOMALY_KEY_PATTERN))
            .await
        {
            Some(keys) => keys,
            None => return Vec::new(),
        };

        let mut records = Vec::new();
        for key in keys.iter().take(limit) {
            if let Some(Some(raw)) = self.call("get", key, self.store.get(key)).await {
                match serde_json::from_str::<AnomalyRecord>(&raw) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!(key = %key, error = %e, "Skipping unparseable anomaly"),
                }
            }
        }
        records
    }

    /// Approximate bytes used by all keys in the store
    pub async fn footprint(&self) -> u64 {
        if !self.is_enabled() {
            return 0;
        }

        let keys = match self.call("keys", "*", self.store.keys("*")).await {
            Some(keys) => keys,
            None => return 0,
        };

        let mut total = 0u64;
        for key in &keys {
            if let Some(Some(size)) = self
                .call("memory_usage", key, self.store.memory_usage(key))
                .await
            {
                total += size;
            }
        }
        total
    }

    /// `None` when no cache is configured
    pub async fn healthy(&self) -> Option<bool> {
        if !self.is_enabled() {
            return None;
        }
        Some(self.call("ping", "", self.store.ping()).await.is_some())
    }
}
