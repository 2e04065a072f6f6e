//! Ingestion pipeline workers
//!
//! The processing worker is the only task that mutates engine state. It
//! drains the bounded ingestion queue in arrival order and, for every
//! observation, scores it, updates the window and counters under the write
//! lock, then records any anomaly with the lock released.
//!
//! The checkpointer periodically copies the state under the read lock and
//! writes it to the cache.

use crate::anomaly::ZScoreDetector;
use crate::engine::AnalyticsState;
use crate::health::HealthRegistry;
use crate::models::{AnomalyRecord, Observation};
use crate::observability::StructuredLogger;
use crate::observer::EngineObserver;
use crate::persistence::Persistence;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Single consumer of the ingestion queue
pub struct ProcessingWorker {
    receiver: mpsc::Receiver<Observation>,
    state: Arc<RwLock<AnalyticsState>>,
    detector: ZScoreDetector,
    persistence: Arc<Persistence>,
    observer: Arc<dyn EngineObserver>,
    logger: StructuredLogger,
}

impl ProcessingWorker {
    pub fn new(
        receiver: mpsc::Receiver<Observation>,
        state: Arc<RwLock<AnalyticsState>>,
        detector: ZScoreDetector,
        persistence: Arc<Persistence>,
        observer: Arc<dyn EngineObserver>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            receiver,
            state,
            detector,
            persistence,
            observer,
            logger,
        }
    }

    /// Drain the queue until every sender is dropped
    ///
    /// Returns the number of observations processed by this run.
    pub async fn run(mut self) -> u64 {
        info!(
            threshold = self.detector.threshold,
            min_samples = self.detector.min_samples,
            "Starting processing worker"
        );

        let mut processed = 0u64;
        while let Some(observation) = self.receiver.recv().await {
            self.process(observation).await;
            processed += 1;
        }

        info!(processed = processed, "Ingestion queue closed and drained");
        processed
    }

    async fn process(&mut self, observation: Observation) {
        let (outlier, rolling_avg, flagged) = {
            let mut state = self.state.write().await;

            // Scored against the window as it stood before this observation
            let outlier = self.detector.detect(observation.rps, &state.window);
            let flagged = outlier.as_ref().map(|_| observation.clone());

            state.window.record(observation);
            state.total_processed += 1;
            if outlier.is_some() {
                state.anomaly_count += 1;
            }

            (outlier, state.window.rolling_average(), flagged)
        };

        self.observer.record_processed();

        if let (Some(outlier), Some(metric)) = (outlier, flagged) {
            self.observer.record_anomaly();
            self.logger.log_anomaly(&metric, &outlier, rolling_avg);

            let record = AnomalyRecord {
                metric,
                timestamp: Utc::now(),
                rolling_avg,
            };
            self.persistence.record_anomaly(&record).await;
        }

        self.observer.set_rolling_average(rolling_avg);
        self.observer.set_queue_depth(self.receiver.len());
    }
}

/// Periodic checkpoint task
pub struct Checkpointer {
    state: Arc<RwLock<AnalyticsState>>,
    persistence: Arc<Persistence>,
    interval: Duration,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Checkpointer {
    pub fn new(
        state: Arc<RwLock<AnalyticsState>>,
        persistence: Arc<Persistence>,
        interval: Duration,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            state,
            persistence,
            interval,
            logger,
            health: None,
        }
    }

    /// Report each checkpoint outcome to the registry
    pub fn with_health(mut self, health: Option<HealthRegistry>) -> Self {
        self.health = health;
        self
    }

    /// Write a checkpoint every interval until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.persistence.is_enabled() {
            debug!("No cache configured, periodic checkpoints disabled");
            let _ = shutdown.recv().await;
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting checkpoint loop"
        );

        let mut ticker = interval(self.interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; state was just restored
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.checkpoint("periodic").await;
                }
                _ = shutdown.recv() => {
                    debug!("Stopping checkpoint loop");
                    break;
                }
            }
        }
    }

    /// Copy state under the read lock, then write it without holding the lock
    pub async fn checkpoint(&self, reason: &str) -> bool {
        let checkpoint = self.state.read().await.checkpoint();
        let ok = self.persistence.snapshot(&checkpoint).await;

        self.logger.log_checkpoint(
            checkpoint.total_processed,
            checkpoint.window.len(),
            ok,
            reason,
        );
        if let Some(health) = &self.health {
            health.record_checkpoint(ok).await;
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{components, CacheStatus, ComponentStatus};
    use crate::observer::NoopObserver;
    use crate::persistence::{ANOMALY_KEY_PATTERN, STATS_KEY};
    use crate::store::{CacheStore, MemoryStore};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        processed: AtomicU64,
        anomalies: AtomicU64,
        last_depth: AtomicUsize,
    }

    impl EngineObserver for CountingObserver {
        fn record_processed(&self) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }

        fn record_anomaly(&self) {
            self.anomalies.fetch_add(1, Ordering::SeqCst);
        }

        fn set_rolling_average(&self, _value: f64) {}

        fn set_queue_depth(&self, depth: usize) {
            self.last_depth.store(depth, Ordering::SeqCst);
        }
    }

    fn obs(rps: u64) -> Observation {
        Observation::new("dev-1", Utc::now(), 20.0, 100.0, rps)
    }

    fn persistence(store: Arc<MemoryStore>) -> Arc<Persistence> {
        Arc::new(Persistence::new(
            store,
            Duration::from_secs(300),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_worker_processes_in_order_and_flags() {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(RwLock::new(AnalyticsState::new(50)));
        let observer = Arc::new(CountingObserver::default());
        let (tx, rx) = mpsc::channel(64);

        let worker = ProcessingWorker::new(
            rx,
            state.clone(),
            ZScoreDetector::default(),
            persistence(store.clone()),
            observer.clone(),
            StructuredLogger::new("test"),
        );

        for v in [90, 110, 90, 110, 90, 110, 90, 110, 90, 110, 125, 100] {
            tx.send(obs(v)).await.unwrap();
        }
        drop(tx);

        let processed = worker.run().await;
        assert_eq!(processed, 12);

        let state = state.read().await;
        assert_eq!(state.total_processed, 12);
        assert_eq!(state.anomaly_count, 1);
        let rps: Vec<u64> = state.window.iter().map(|o| o.rps).collect();
        assert_eq!(rps, vec![90, 110, 90, 110, 90, 110, 90, 110, 90, 110, 125, 100]);

        assert_eq!(observer.processed.load(Ordering::SeqCst), 12);
        assert_eq!(observer.anomalies.load(Ordering::SeqCst), 1);
        assert_eq!(observer.last_depth.load(Ordering::SeqCst), 0);

        assert_eq!(store.keys(ANOMALY_KEY_PATTERN).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpointer_writes_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(RwLock::new(AnalyticsState::new(10)));
        {
            let mut s = state.write().await;
            s.window.record(obs(7));
            s.total_processed = 1;
        }

        let checkpointer = Checkpointer::new(
            state,
            persistence(store.clone()),
            Duration::from_millis(20),
            StructuredLogger::new("test"),
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(checkpointer.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let raw = store.get(STATS_KEY).await.unwrap().expect("stats checkpoint");
        assert!(raw.contains("\"total_processed\":1"));
    }

    #[tokio::test]
    async fn test_checkpoint_outcome_reported_to_health() {
        let store = Arc::new(MemoryStore::new());
        let health = HealthRegistry::new("test");
        health.register(components::CHECKPOINTER).await;

        let checkpointer = Checkpointer::new(
            Arc::new(RwLock::new(AnalyticsState::new(10))),
            persistence(store.clone()),
            Duration::from_secs(3600),
            StructuredLogger::new("test"),
        )
        .with_health(Some(health.clone()));

        store.set_available(false);
        assert!(!checkpointer.checkpoint("periodic").await);
        let report = health.health(CacheStatus::Unhealthy).await;
        assert_eq!(
            report.components[components::CHECKPOINTER].status,
            ComponentStatus::Degraded
        );

        store.set_available(true);
        assert!(checkpointer.checkpoint("periodic").await);
        let report = health.health(CacheStatus::Healthy).await;
        assert_eq!(
            report.components[components::CHECKPOINTER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_worker_survives_store_outage() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let state = Arc::new(RwLock::new(AnalyticsState::new(50)));
        let (tx, rx) = mpsc::channel(64);

        let worker = ProcessingWorker::new(
            rx,
            state.clone(),
            ZScoreDetector::default(),
            persistence(store),
            Arc::new(NoopObserver),
            StructuredLogger::new("test"),
        );

        for v in [1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 1000] {
            tx.send(obs(v)).await.unwrap();
        }
        drop(tx);

        assert_eq!(worker.run().await, 11);
        let state = state.read().await;
        assert_eq!(state.total_processed, 11);
        assert_eq!(state.anomaly_count, 1);
    }
}
