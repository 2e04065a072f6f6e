//! Streaming metrics analytics engine
//!
//! This crate provides the core functionality for:
//! - A sliding window of device observations with a rolling throughput average
//! - Z-score anomaly detection over the window
//! - A bounded ingestion queue drained by a single processing worker
//! - Best-effort checkpointing to an external key-value cache
//! - Health checks and observability

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;
pub mod observer;
pub mod persistence;
pub mod pipeline;
pub mod store;
pub mod window;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{AnalyticsEngine, EngineError};
pub use health::{
    CacheStatus, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use observer::{EngineObserver, NoopObserver};
pub use store::{CacheStore, MemoryStore, NullStore, RedisStore, StoreError};
pub use window::MetricsWindow;
