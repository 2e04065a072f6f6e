//! Hook for exporting engine activity to a metrics backend

/// Receives notifications from the processing worker after each update
///
/// Implementations must be cheap; they are called on the consumer task.
pub trait EngineObserver: Send + Sync {
    fn record_processed(&self);

    fn record_anomaly(&self);

    fn set_rolling_average(&self, value: f64);

    fn set_queue_depth(&self, depth: usize);
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn record_processed(&self) {}

    fn record_anomaly(&self) {}

    fn set_rolling_average(&self, _value: f64) {}

    fn set_queue_depth(&self, _depth: usize) {}
}
