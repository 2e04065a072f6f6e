//! Engine configuration

use crate::anomaly::{DEFAULT_THRESHOLD, MIN_SAMPLES_FOR_DETECTION};
use crate::window::DEFAULT_WINDOW_SIZE;
use anyhow::Result;
use std::time::Duration;

/// Tunables for one engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name used in structured log events
    pub instance_name: String,
    /// Observations kept in the sliding window (default: 50)
    pub window_size: usize,
    /// Ingestion queue capacity before producers block (default: 1000)
    pub queue_capacity: usize,
    /// Z-score above which an observation is an anomaly (default: 2.0)
    pub anomaly_threshold: f64,
    /// Window length required before detection runs (default: 10)
    pub min_samples: usize,
    /// Expiry applied to every key written to the cache (default: 5 minutes)
    pub cache_ttl: Duration,
    /// Interval between periodic checkpoints (default: 30 seconds)
    pub checkpoint_interval: Duration,
    /// Upper bound on any single cache call (default: 2 seconds)
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_name: "analytics".to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            queue_capacity: 1000,
            anomaly_threshold: DEFAULT_THRESHOLD,
            min_samples: MIN_SAMPLES_FOR_DETECTION,
            cache_ttl: Duration::from_secs(5 * 60),
            checkpoint_interval: Duration::from_secs(30),
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// Builder for [`EngineConfig`] with validation
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.config.instance_name = name.into();
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn anomaly_threshold(mut self, threshold: f64) -> Self {
        self.config.anomaly_threshold = threshold;
        self
    }

    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.config.min_samples = min_samples;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.config.checkpoint_interval = interval;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        let config = self.config;

        if config.window_size == 0 {
            anyhow::bail!("window_size must be at least 1");
        }
        if config.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if !(config.anomaly_threshold.is_finite() && config.anomaly_threshold > 0.0) {
            anyhow::bail!(
                "anomaly_threshold must be a positive number, got {}",
                config.anomaly_threshold
            );
        }
        if config.checkpoint_interval.is_zero() {
            anyhow::bail!("checkpoint_interval must be non-zero");
        }

        Ok(config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
