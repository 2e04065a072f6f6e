//! Observability infrastructure for the analytics engine
//!
//! Provides:
//! - Prometheus metrics (processed/anomaly counters, rolling average, queue depth, HTTP traffic)
//! - Structured event logging with tracing

use crate::anomaly::{Outlier, OutlierSeverity};
use crate::models::Observation;
use crate::observer::EngineObserver;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for HTTP request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    metrics_processed: IntCounter,
    anomalies_detected: IntCounter,
    rolling_average_rps: Gauge,
    processing_queue_size: IntGauge,
    http_requests: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            metrics_processed: register_int_counter!(
                "analytics_metrics_processed_total",
                "Total number of observations processed"
            )
            .expect("Failed to register metrics_processed_total"),

            anomalies_detected: register_int_counter!(
                "analytics_anomalies_detected_total",
                "Total number of anomalies detected"
            )
            .expect("Failed to register anomalies_detected_total"),

            rolling_average_rps: register_gauge!(
                "analytics_rolling_average_rps",
                "Rolling average requests per second over the current window"
            )
            .expect("Failed to register rolling_average_rps"),

            processing_queue_size: register_int_gauge!(
                "analytics_processing_queue_size",
                "Observations waiting in the ingestion queue"
            )
            .expect("Failed to register processing_queue_size"),

            http_requests: register_int_counter_vec!(
                "analytics_http_requests_total",
                "Total number of HTTP requests",
                &["method", "endpoint", "status"]
            )
            .expect("Failed to register http_requests_total"),

            http_request_duration_seconds: register_histogram_vec!(
                "analytics_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register http_request_duration_seconds"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same registered collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    /// Record one completed HTTP request
    pub fn observe_http_request(
        &self,
        method: &str,
        endpoint: &str,
        status: u16,
        elapsed: Duration,
    ) {
        let status = status.to_string();
        self.inner()
            .http_requests
            .with_label_values(&[method, endpoint, &status])
            .inc();
        self.inner()
            .http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(elapsed.as_secs_f64());
    }
}

impl EngineObserver for EngineMetrics {
    fn record_processed(&self) {
        self.inner().metrics_processed.inc();
    }

    fn record_anomaly(&self) {
        self.inner().anomalies_detected.inc();
    }

    fn set_rolling_average(&self, value: f64) {
        self.inner().rolling_average_rps.set(value);
    }

    fn set_queue_depth(&self, depth: usize) {
        self.inner().processing_queue_size.set(depth as i64);
    }
}

/// Structured logger for engine lifecycle and detection events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log engine startup
    pub fn log_startup(&self, window_size: usize, queue_capacity: usize, backend: &str) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            window_size = window_size,
            queue_capacity = queue_capacity,
            cache_backend = %backend,
            "Analytics engine started"
        );
    }

    /// Log state recovered from the cache
    pub fn log_restore(&self, total_processed: u64, anomaly_count: u64, window_len: usize) {
        info!(
            event = "state_restored",
            instance = %self.instance,
            total_processed = total_processed,
            anomaly_count = anomaly_count,
            window_len = window_len,
            "Restored analytics state from cache"
        );
    }

    /// Log a flagged observation
    pub fn log_anomaly(&self, observation: &Observation, outlier: &Outlier, rolling_avg: f64) {
        match outlier.severity() {
            OutlierSeverity::Critical => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    device_id = %observation.device_id,
                    rps = observation.rps,
                    mean = outlier.mean,
                    std_dev = outlier.std_dev,
                    z_score = outlier.z_score,
                    rolling_avg = rolling_avg,
                    severity = outlier.severity().as_str(),
                    "Critical throughput anomaly detected"
                );
            }
            OutlierSeverity::Warning => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    device_id = %observation.device_id,
                    rps = observation.rps,
                    mean = outlier.mean,
                    std_dev = outlier.std_dev,
                    z_score = outlier.z_score,
                    rolling_avg = rolling_avg,
                    severity = outlier.severity().as_str(),
                    "Throughput anomaly detected"
                );
            }
        }
    }

    /// Log the outcome of a checkpoint write
    pub fn log_checkpoint(
        &self,
        total_processed: u64,
        window_len: usize,
        success: bool,
        reason: &str,
    ) {
        if success {
            info!(
                event = "checkpoint_written",
                instance = %self.instance,
                total_processed = total_processed,
                window_len = window_len,
                reason = %reason,
                "Checkpoint written to cache"
            );
        } else {
            warn!(
                event = "checkpoint_failed",
                instance = %self.instance,
                total_processed = total_processed,
                window_len = window_len,
                reason = %reason,
                "Checkpoint could not be written, continuing in memory"
            );
        }
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, drained: u64, total_processed: u64) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            drained = drained,
            total_processed = total_processed,
            "Analytics engine stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_observer() {
        // Collectors live in the global registry; repeated handles must share them
        let metrics = EngineMetrics::new();
        let other = EngineMetrics::new();

        metrics.record_processed();
        metrics.record_anomaly();
        metrics.set_rolling_average(12.5);
        other.set_queue_depth(3);
        metrics.observe_http_request("GET", "/api/analytics/stats", 200, Duration::from_millis(4));

        let families = prometheus::gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"analytics_metrics_processed_total".to_string()));
        assert!(names.contains(&"analytics_http_requests_total".to_string()));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
    }
}
