//! Analytics engine facade
//!
//! Owns the shared state, the ingestion queue and the background tasks, and
//! exposes the producer (`submit`) and query APIs used by the transport
//! layer.

use crate::anomaly::ZScoreDetector;
use crate::config::EngineConfig;
use crate::health::{components, HealthRegistry};
use crate::models::{AnomalyRecord, EngineStats, Observation, SubmitAck};
use crate::observability::StructuredLogger;
use crate::observer::EngineObserver;
use crate::persistence::{Checkpoint, Persistence, RestoredState};
use crate::pipeline::{Checkpointer, ProcessingWorker};
use crate::store::CacheStore;
use crate::window::MetricsWindow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

/// Errors surfaced to producers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("analytics engine is not running")]
    NotRunning,
}

/// Aggregate state guarded by the engine lock
#[derive(Debug)]
pub struct AnalyticsState {
    pub(crate) window: MetricsWindow,
    pub(crate) total_processed: u64,
    pub(crate) anomaly_count: u64,
}

impl AnalyticsState {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: MetricsWindow::new(window_size),
            total_processed: 0,
            anomaly_count: 0,
        }
    }

    /// Rebuild state from a checkpoint; the rolling average is recomputed
    pub fn from_restored(window_size: usize, restored: RestoredState) -> Self {
        let mut state = Self::new(window_size);
        state.total_processed = restored.total_processed;
        state.anomaly_count = restored.anomaly_count;
        if !restored.window.is_empty() {
            state.window.restore(restored.window);
        }
        state
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats::new(
            self.total_processed,
            self.anomaly_count,
            self.window.rolling_average(),
        )
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            total_processed: self.total_processed,
            anomaly_count: self.anomaly_count,
            rolling_average: self.window.rolling_average(),
            window: self.window.to_vec(),
        }
    }
}

struct EngineTasks {
    worker: JoinHandle<u64>,
    checkpointer: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Streaming analytics engine
///
/// `submit` is eventually consistent: it enqueues the observation and returns
/// the rolling average as of the call together with an unknown anomaly flag.
/// The real determination happens later on the processing worker.
pub struct AnalyticsEngine {
    config: EngineConfig,
    state: Arc<RwLock<AnalyticsState>>,
    persistence: Arc<Persistence>,
    sender: RwLock<Option<mpsc::Sender<Observation>>>,
    tasks: Mutex<Option<EngineTasks>>,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl AnalyticsEngine {
    /// Restore state from the cache and spawn the worker and checkpoint tasks
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self::launch(config, store, observer, None).await
    }

    /// Like `start`, also reporting checkpoint outcomes and shutdown to
    /// `health`
    pub async fn start_with_health(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        observer: Arc<dyn EngineObserver>,
        health: HealthRegistry,
    ) -> Self {
        Self::launch(config, store, observer, Some(health)).await
    }

    async fn launch(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        observer: Arc<dyn EngineObserver>,
        health: Option<HealthRegistry>,
    ) -> Self {
        let logger = StructuredLogger::new(config.instance_name.clone());
        let persistence = Arc::new(Persistence::new(
            store,
            config.cache_ttl,
            config.store_timeout,
        ));

        let restored = persistence.restore().await;
        if !restored.is_empty() {
            logger.log_restore(
                restored.total_processed,
                restored.anomaly_count,
                restored.window.len(),
            );
        }

        let state = AnalyticsState::from_restored(config.window_size, restored);
        observer.set_rolling_average(state.window.rolling_average());
        let state = Arc::new(RwLock::new(state));

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let detector =
            ZScoreDetector::new(config.anomaly_threshold).with_min_samples(config.min_samples);

        let worker = ProcessingWorker::new(
            receiver,
            Arc::clone(&state),
            detector,
            Arc::clone(&persistence),
            observer,
            logger.clone(),
        );
        let worker = tokio::spawn(worker.run());

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let checkpointer = Checkpointer::new(
            Arc::clone(&state),
            Arc::clone(&persistence),
            config.checkpoint_interval,
            logger.clone(),
        )
        .with_health(health.clone());
        let checkpointer = tokio::spawn(checkpointer.run(shutdown_rx));

        logger.log_startup(
            config.window_size,
            config.queue_capacity,
            persistence.backend(),
        );

        Self {
            config,
            state,
            persistence,
            sender: RwLock::new(Some(sender)),
            tasks: Mutex::new(Some(EngineTasks {
                worker,
                checkpointer,
                shutdown_tx,
            })),
            logger,
            health,
        }
    }

    /// Enqueue an observation for processing
    ///
    /// Blocks while the queue is full. When a cache is configured, an audit
    /// copy is written in the background without delaying the enqueue.
    pub async fn submit(&self, observation: Observation) -> Result<SubmitAck, EngineError> {
        let sender = self
            .sender
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotRunning)?;

        if self.persistence.is_enabled() {
            let persistence = Arc::clone(&self.persistence);
            let audit_copy = observation.clone();
            tokio::spawn(async move {
                persistence.audit(&audit_copy).await;
            });
        }

        sender
            .send(observation)
            .await
            .map_err(|_| EngineError::NotRunning)?;

        let rolling_average = self.state.read().await.window.rolling_average();

        Ok(SubmitAck {
            rolling_average,
            is_anomaly: None,
        })
    }

    /// Counters and rolling average from a single lock acquisition
    pub async fn stats(&self) -> EngineStats {
        self.state.read().await.stats()
    }

    /// Copy of the window contents, oldest first
    pub async fn current_window(&self) -> Vec<Observation> {
        self.state.read().await.window.to_vec()
    }

    pub async fn rolling_average(&self) -> f64 {
        self.state.read().await.window.rolling_average()
    }

    /// Anomaly records still held by the cache, in store order
    pub async fn recent_anomalies(&self, limit: usize) -> Vec<AnomalyRecord> {
        self.persistence.recent_anomalies(limit).await
    }

    /// Approximate bytes used in the cache
    pub async fn cache_footprint(&self) -> u64 {
        self.persistence.footprint().await
    }

    /// Cache reachability; `None` when running memory-only
    pub async fn store_healthy(&self) -> Option<bool> {
        self.persistence.healthy().await
    }

    pub fn cache_backend(&self) -> &'static str {
        self.persistence.backend()
    }

    pub async fn is_running(&self) -> bool {
        self.sender.read().await.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close the queue, wait for the drain, then take a final checkpoint
    ///
    /// Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        let tasks = match self.tasks.lock().await.take() {
            Some(tasks) => tasks,
            None => return,
        };

        // Dropping the last engine-held sender closes the queue once any
        // in-flight submits have enqueued
        self.sender.write().await.take();
        if let Some(health) = &self.health {
            health
                .set_unhealthy(components::PIPELINE, "engine stopped")
                .await;
        }

        let drained = match tasks.worker.await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Processing worker terminated abnormally");
                0
            }
        };

        let _ = tasks.shutdown_tx.send(());
        if let Err(e) = tasks.checkpointer.await {
            warn!(error = %e, "Checkpoint task terminated abnormally");
        }

        let checkpoint = self.state.read().await.checkpoint();
        if self.persistence.is_enabled() {
            let ok = self.persistence.snapshot(&checkpoint).await;
            self.logger.log_checkpoint(
                checkpoint.total_processed,
                checkpoint.window.len(),
                ok,
                "shutdown",
            );
            if let Some(health) = &self.health {
                health.record_checkpoint(ok).await;
            }
        }

        self.logger.log_shutdown(drained, checkpoint.total_processed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CacheStatus, ComponentStatus};
    use crate::observer::NoopObserver;
    use crate::store::{MemoryStore, NullStore};
    use chrono::Utc;
    use std::time::Duration;

    fn obs(device: &str, rps: u64) -> Observation {
        Observation::new(device, Utc::now(), 40.0, 900.0, rps)
    }

    fn config(window_size: usize) -> EngineConfig {
        EngineConfig::builder()
            .window_size(window_size)
            .queue_capacity(16)
            .checkpoint_interval(Duration::from_secs(3600))
            .build()
            .unwrap()
    }

    async fn memory_only(window_size: usize) -> AnalyticsEngine {
        AnalyticsEngine::start(
            config(window_size),
            Arc::new(NullStore),
            Arc::new(NoopObserver),
        )
        .await
    }

    #[tokio::test]
    async fn test_submit_then_stop_processes_everything() {
        let engine = memory_only(5).await;

        for v in 1..=8 {
            let ack = engine.submit(obs("a", v)).await.unwrap();
            assert_eq!(ack.is_anomaly, None);
        }
        engine.stop().await;

        let stats = engine.stats().await;
        assert_eq!(stats.total_processed, 8);
        let rps: Vec<u64> = engine.current_window().await.iter().map(|o| o.rps).collect();
        assert_eq!(rps, vec![4, 5, 6, 7, 8]);
        assert!((stats.rolling_average - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_rejected() {
        let engine = memory_only(5).await;
        engine.stop().await;

        assert!(!engine.is_running().await);
        assert_eq!(
            engine.submit(obs("a", 1)).await,
            Err(EngineError::NotRunning)
        );

        // Second stop returns immediately
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_restore_recomputes_rolling_average() {
        let store = Arc::new(MemoryStore::new());

        let first = AnalyticsEngine::start(config(3), store.clone(), Arc::new(NoopObserver)).await;
        for v in [10, 20, 30, 40] {
            first.submit(obs("a", v)).await.unwrap();
        }
        first.stop().await;

        let second = AnalyticsEngine::start(config(3), store, Arc::new(NoopObserver)).await;
        let stats = second.stats().await;
        assert_eq!(stats.total_processed, 4);
        assert!((stats.rolling_average - 30.0).abs() < 1e-9);
        second.stop().await;
    }

    #[tokio::test]
    async fn test_audit_copy_written_on_submit() {
        let store = Arc::new(MemoryStore::new());
        let engine = AnalyticsEngine::start(config(5), store.clone(), Arc::new(NoopObserver)).await;

        engine.submit(obs("edge-1", 3)).await.unwrap();
        engine.stop().await;

        // The audit write is spawned; give it a moment to land
        let mut found = false;
        for _ in 0..50 {
            if !store.keys("metric:edge-1:*").await.unwrap().is_empty() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found);
    }

    #[tokio::test]
    async fn test_stop_reports_pipeline_and_final_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let health = HealthRegistry::new("test");
        health.register(components::PIPELINE).await;
        health.register(components::CHECKPOINTER).await;

        let engine = AnalyticsEngine::start_with_health(
            config(5),
            store.clone(),
            Arc::new(NoopObserver),
            health.clone(),
        )
        .await;
        engine.submit(obs("a", 1)).await.unwrap();
        store.set_available(false);
        engine.stop().await;

        let report = health.health(CacheStatus::Unhealthy).await;
        assert_eq!(report.status, ComponentStatus::Unhealthy);
        assert_eq!(
            report.components[components::PIPELINE].message.as_deref(),
            Some("engine stopped")
        );
        assert_eq!(
            report.components[components::CHECKPOINTER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_memory_only_queries_are_empty() {
        let engine = memory_only(5).await;

        assert!(engine.recent_anomalies(10).await.is_empty());
        assert_eq!(engine.cache_footprint().await, 0);
        assert_eq!(engine.store_healthy().await, None);
        assert_eq!(engine.cache_backend(), "none");
        engine.stop().await;
    }
}
