//! Metric logger seam between the training loop and reporting backends.

use std::collections::HashMap;

/// Sink for reduced metric snapshots.
///
/// The session drains its accumulated metrics once per reporting window and
/// hands the reduced map to a logger. Backends must tolerate snapshots with
/// differing key sets from window to window: eval metrics only appear on eval
/// steps.
pub trait MetricLogger: Send + Sync {
    /// Log one reduced snapshot for the given global step.
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64);

    /// Flush pending writes and release the backend.
    fn close(&self) {}
}

/// Discards every snapshot.
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_metrics(&self, _metrics: &HashMap<String, f64>, _step: u64) {}
}

/// Fans each snapshot out to multiple backends.
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }
}

impl MetricLogger for CompositeLogger {
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}
