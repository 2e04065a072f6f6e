//! Request payload validation

use analytics_lib::Observation;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("device_id must not be empty")]
    EmptyDeviceId,

    #[error("cpu_usage must be between 0 and 100, got {0}")]
    CpuOutOfRange(f64),

    #[error("memory_mb must be a non-negative number, got {0}")]
    InvalidMemory(f64),
}

/// Body of `POST /api/analytics/metrics`
#[derive(Debug, Clone, Deserialize)]
pub struct MetricPayload {
    /// Defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub device_id: String,
    pub cpu_usage: f64,
    pub memory_mb: f64,
    pub rps: u64,
}

impl MetricPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device_id.trim().is_empty() {
            return Err(ValidationError::EmptyDeviceId);
        }
        if !(0.0..=100.0).contains(&self.cpu_usage) {
            return Err(ValidationError::CpuOutOfRange(self.cpu_usage));
        }
        if !(self.memory_mb.is_finite() && self.memory_mb >= 0.0) {
            return Err(ValidationError::InvalidMemory(self.memory_mb));
        }
        Ok(())
    }

    pub fn into_observation(self) -> Result<Observation, ValidationError> {
        self.validate()?;
        Ok(Observation::new(
            self.device_id,
            self.timestamp.unwrap_or_else(Utc::now),
            self.cpu_usage,
            self.memory_mb,
            self.rps,
        ))
    }
}
