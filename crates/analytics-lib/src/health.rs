//! Health tracking for the analytics service
//!
//! Components report their own status; the cache status is probed on demand
//! because it can change without the engine noticing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational with reduced guarantees (e.g. checkpoints failing)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Reachability of the external cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Healthy,
    Unhealthy,
    /// No cache configured; the engine runs memory-only
    Disabled,
}

impl CacheStatus {
    /// Map the result of a store ping (`None` when no store is configured)
    pub fn from_probe(probe: Option<bool>) -> Self {
        match probe {
            None => CacheStatus::Disabled,
            Some(true) => CacheStatus::Healthy,
            Some(false) => CacheStatus::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub cache: CacheStatus,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
}

impl HealthResponse {
    /// Worst status across components
    ///
    /// An unreachable cache only degrades the service; the engine keeps
    /// processing in memory.
    pub fn compute_status(
        components: &HashMap<String, ComponentHealth>,
        cache: CacheStatus,
    ) -> ComponentStatus {
        let mut status = ComponentStatus::Healthy;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }
        if cache == CacheStatus::Unhealthy {
            status = ComponentStatus::Degraded;
        }
        status
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const PIPELINE: &str = "pipeline";
    pub const CHECKPOINTER: &str = "checkpointer";
}

/// Shared registry of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    environment: String,
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// A failed checkpoint degrades the checkpointer until the next success
    pub async fn record_checkpoint(&self, ok: bool) {
        if ok {
            self.set_healthy(components::CHECKPOINTER).await;
        } else {
            self.set_degraded(components::CHECKPOINTER, "checkpoint write failed")
                .await;
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Build the liveness report given the latest cache probe
    pub async fn health(&self, cache: CacheStatus) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components, cache);
        HealthResponse {
            status,
            components,
            cache,
            timestamp: Utc::now(),
            environment: self.environment.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Analytics engine not running".to_string()),
            };
        }

        let unhealthy = self
            .components
            .read()
            .await
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.clone());

        match unhealthy {
            Some(name) => ReadinessResponse {
                ready: false,
                reason: Some(format!("Component {} unhealthy", name)),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
