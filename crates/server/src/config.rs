//! Server configuration

use analytics_lib::EngineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Which cache backs checkpoints and anomaly records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
    None,
}

/// Server configuration, read from `ANALYTICS_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for the API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackend,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    #[serde(default)]
    pub redis_password: Option<String>,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Expiry for every cache key
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,

    /// Deployment label reported by the health probe
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Redis
}

fn default_redis_host() -> String {
    "redis".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_window_size() -> usize {
    50
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_anomaly_threshold() -> f64 {
    2.0
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_checkpoint_interval() -> u64 {
    30
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cache_backend: default_cache_backend(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_password: None,
            window_size: default_window_size(),
            queue_capacity: default_queue_capacity(),
            anomaly_threshold: default_anomaly_threshold(),
            cache_ttl_secs: default_cache_ttl(),
            checkpoint_interval_secs: default_checkpoint_interval(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("ANALYTICS").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid ANALYTICS_* configuration")
    }

    /// Connection URL for the configured Redis instance
    pub fn redis_url(&self) -> String {
        analytics_lib::RedisStore::url_for(
            &self.redis_host,
            self.redis_port,
            self.redis_password.as_deref(),
        )
    }

    /// Engine tunables derived from this configuration
    pub fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::builder()
            .instance_name(format!("analytics-{}", self.environment))
            .window_size(self.window_size)
            .queue_capacity(self.queue_capacity)
            .anomaly_threshold(self.anomaly_threshold)
            .cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .checkpoint_interval(Duration::from_secs(self.checkpoint_interval_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_source(
            config::Environment::with_prefix("ANALYTICS")
                .try_parsing(true)
                .source(Some(env)),
        )
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.cache_backend, CacheBackend::Redis);
        assert_eq!(config.redis_host, "redis");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.window_size, 50);
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_map(&[
            ("ANALYTICS_API_PORT", "9000"),
            ("ANALYTICS_CACHE_BACKEND", "memory"),
            ("ANALYTICS_WINDOW_SIZE", "20"),
            ("ANALYTICS_ENVIRONMENT", "production"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.window_size, 20);
        assert_eq!(config.engine_config().unwrap().window_size, 20);
    }

    #[test]
    fn test_redis_url() {
        let mut config = ServerConfig::default();
        assert_eq!(config.redis_url(), "redis://redis:6379/0");

        config.redis_password = Some("s3cret".to_string());
        assert_eq!(config.redis_url(), "redis://:s3cret@redis:6379/0");
    }

    #[test]
    fn test_invalid_engine_settings_rejected() {
        let config = ServerConfig {
            window_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.engine_config().is_err());
    }
}
