//! Console reporting backend.

use std::collections::HashMap;

use super::MetricLogger;

/// Emits each metric snapshot as a single tracing event, keys sorted so
/// consecutive windows line up when read as plain text.
#[derive(Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        let mut entries: Vec<String> = metrics
            .iter()
            .map(|(name, value)| format!("{}={:.4}", name, value))
            .collect();
        entries.sort();
        let line = entries.join(" ");
        tracing::info!(step, "{}", line);
    }
}
