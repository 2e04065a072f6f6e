//! Throughput outlier detection
//!
//! Scores a throughput value against the population mean and standard
//! deviation of the current window and flags it when the z-score exceeds a
//! fixed threshold.

use crate::window::MetricsWindow;

/// Default number of standard deviations to consider an outlier
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Minimum window length before detection is attempted
pub const MIN_SAMPLES_FOR_DETECTION: usize = 10;

/// Z-score outlier detector
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    /// Number of standard deviations to consider an outlier
    pub threshold: f64,
    /// Window length below which detection abstains
    pub min_samples: usize,
}

impl ZScoreDetector {
    /// Create a detector with the given threshold
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            min_samples: MIN_SAMPLES_FOR_DETECTION,
        }
    }

    /// Set a custom minimum sample count
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Score `value` against `window`
    ///
    /// # Returns
    /// * `Some(Outlier)` if the z-score is strictly above the threshold
    /// * `None` if the window is too short, has no variance, or the value is in range
    pub fn detect(&self, value: u64, window: &MetricsWindow) -> Option<Outlier> {
        if window.len() < self.min_samples {
            return None;
        }

        let (mean, std_dev) = window.mean_and_stddev()?;
        if std_dev == 0.0 {
            return None;
        }

        let z_score = (value as f64 - mean).abs() / std_dev;

        if z_score > self.threshold {
            Some(Outlier {
                value,
                mean,
                std_dev,
                z_score,
                threshold: self.threshold,
            })
        } else {
            None
        }
    }

    pub fn is_anomaly(&self, value: u64, window: &MetricsWindow) -> bool {
        self.detect(value, window).is_some()
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Details of a flagged throughput value
#[derive(Debug, Clone, PartialEq)]
pub struct Outlier {
    pub value: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
}

impl Outlier {
    /// Critical once the z-score reaches twice the threshold
    pub fn severity(&self) -> OutlierSeverity {
        if self.z_score >= self.threshold * 2.0 {
            OutlierSeverity::Critical
        } else {
            OutlierSeverity::Warning
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierSeverity {
    Warning,
    Critical,
}

impl OutlierSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierSeverity::Warning => "warning",
            OutlierSeverity::Critical => "critical",
        }
    }
}
