//! Anomaly detection for device throughput
//!
//! Provides a z-score detector that scores each processed observation
//! against the window it arrives into.

mod zscore;

pub use zscore::{
    Outlier, OutlierSeverity, ZScoreDetector, DEFAULT_THRESHOLD, MIN_SAMPLES_FOR_DETECTION,
};
