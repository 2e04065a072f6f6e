//! Bounded observation window
//!
//! Keeps the most recent observations in arrival order and maintains the
//! rolling average throughput over them. Eviction is strict FIFO once the
//! window reaches capacity.

use crate::models::Observation;
use std::collections::VecDeque;

/// Default number of observations kept in the window
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Bounded, order-preserving buffer of recent observations
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    samples: VecDeque<Observation>,
    capacity: usize,
    rolling_avg: f64,
}

impl MetricsWindow {
    /// Create an empty window holding at most `capacity` observations
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            rolling_avg: 0.0,
        }
    }

    /// Append an observation, evicting the oldest when over capacity
    pub fn record(&mut self, observation: Observation) {
        self.samples.push_back(observation);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.rolling_avg = self.compute_average();
    }

    /// Replace the contents with previously checkpointed observations
    ///
    /// Only the last `capacity` items are kept if the input is longer.
    pub fn restore(&mut self, observations: Vec<Observation>) {
        let skip = observations.len().saturating_sub(self.capacity);
        self.samples = observations.into_iter().skip(skip).collect();
        self.rolling_avg = self.compute_average();
    }

    /// Last computed rolling average; not recomputed on read
    pub fn rolling_average(&self) -> f64 {
        self.rolling_avg
    }

    /// Population mean and standard deviation of throughput
    ///
    /// Two passes over the window: the mean first, then the squared
    /// deviations from it. Returns `None` for an empty window.
    pub fn mean_and_stddev(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }

        let n = self.samples.len() as f64;
        let mean = self.samples.iter().map(|m| m.rps as f64).sum::<f64>() / n;

        let squared_deviations: f64 = self
            .samples
            .iter()
            .map(|m| {
                let d = m.rps as f64 - mean;
                d * d
            })
            .sum();
        let variance = (squared_deviations / n).max(0.0);

        Some((mean, variance.sqrt()))
    }

    fn compute_average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.samples.iter().map(|m| m.rps).sum();
        sum as f64 / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.samples.iter()
    }

    /// Owned copy of the window contents, oldest first
    pub fn to_vec(&self) -> Vec<Observation> {
        self.samples.iter().cloned().collect()
    }
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
