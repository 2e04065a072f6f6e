//! Core data models for the analytics engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single telemetry sample reported by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    /// CPU utilization percentage (0-100)
    pub cpu_usage: f64,
    pub memory_mb: f64,
    /// Requests per second
    pub rps: u64,
}

impl Observation {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        cpu_usage: f64,
        memory_mb: f64,
        rps: u64,
    ) -> Self {
        Self {
            timestamp,
            device_id: device_id.into(),
            cpu_usage,
            memory_mb,
            rps,
        }
    }
}

/// A flagged observation together with the context it was flagged in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub metric: Observation,
    /// Detection time
    pub timestamp: DateTime<Utc>,
    /// Rolling average after the flagged observation entered the window
    pub rolling_avg: f64,
}

/// Point-in-time view of the aggregate counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_processed: u64,
    pub anomalies_detected: u64,
    pub anomaly_rate_percent: f64,
    pub rolling_average: f64,
}

impl EngineStats {
    pub fn new(total_processed: u64, anomalies_detected: u64, rolling_average: f64) -> Self {
        let anomaly_rate_percent = if total_processed == 0 {
            0.0
        } else {
            anomalies_detected as f64 / total_processed as f64 * 100.0
        };

        Self {
            total_processed,
            anomalies_detected,
            anomaly_rate_percent,
            rolling_average,
        }
    }
}

/// Synchronous acknowledgement returned by `submit`
///
/// The rolling average is read at submit time, before the submitted
/// observation is processed. `is_anomaly` is always `None` because
/// detection runs later on the consumer task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub rolling_average: f64,
    pub is_anomaly: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_rate_zero_when_nothing_processed() {
        let stats = EngineStats::new(0, 0, 0.0);
        assert_eq!(stats.anomaly_rate_percent, 0.0);
    }

    #[test]
    fn test_anomaly_rate_percentage() {
        let stats = EngineStats::new(200, 5, 42.0);
        assert!((stats.anomaly_rate_percent - 2.5).abs() < 1e-9);
        assert_eq!(stats.rolling_average, 42.0);
    }

    #[test]
    fn test_observation_json_is_field_named() {
        let obs = Observation::new("sensor-1", Utc::now(), 12.5, 256.0, 40);
        let json: serde_json::Value = serde_json::to_value(&obs).unwrap();

        assert_eq!(json["device_id"], "sensor-1");
        assert_eq!(json["rps"], 40);
        assert_eq!(json["cpu_usage"], 12.5);
        assert!(json.get("timestamp").is_some());
    }
}
