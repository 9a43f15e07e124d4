//! Running metric aggregation, split by train/eval mode.

use std::collections::HashMap;

/// Which phase an observation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    fn prefix(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Eval => "eval",
        }
    }
}

/// Accumulates scalar observations per metric name and mode.
///
/// Observations pile up across steps; `reduce` averages them without clearing
/// so the outer loop decides when a reporting window ends via `drain`.
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    train: HashMap<String, Vec<f64>>,
    eval: HashMap<String, Vec<f64>>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&mut self, mode: Mode) -> &mut HashMap<String, Vec<f64>> {
        match mode {
            Mode::Train => &mut self.train,
            Mode::Eval => &mut self.eval,
        }
    }

    /// Record one observation.
    pub fn push(&mut self, mode: Mode, name: &str, value: f64) {
        self.bucket(mode)
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    /// Mean of every metric in `mode`, keys namespaced `train.*` / `eval.*`.
    pub fn reduce(&self, mode: Mode) -> HashMap<String, f64> {
        let bucket = match mode {
            Mode::Train => &self.train,
            Mode::Eval => &self.eval,
        };
        bucket
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (format!("{}.{}", mode.prefix(), name), mean)
            })
            .collect()
    }

    /// Reduce and clear the observations for `mode`.
    pub fn drain(&mut self, mode: Mode) -> HashMap<String, f64> {
        let reduced = self.reduce(mode);
        self.bucket(mode).clear();
        reduced
    }

    /// Number of observations recorded for a metric.
    pub fn count(&self, mode: Mode, name: &str) -> usize {
        let bucket = match mode {
            Mode::Train => &self.train,
            Mode::Eval => &self.eval,
        };
        bucket.get(name).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_means_and_namespaces() {
        let mut acc = MetricsAccumulator::new();
        acc.push(Mode::Train, "reward", 1.0);
        acc.push(Mode::Train, "reward", 3.0);
        acc.push(Mode::Eval, "reward", 10.0);

        let train = acc.reduce(Mode::Train);
        assert_eq!(train["train.reward"], 2.0);
        assert!(!train.contains_key("eval.reward"));

        let eval = acc.reduce(Mode::Eval);
        assert_eq!(eval["eval.reward"], 10.0);
    }

    #[test]
    fn drain_resets_only_requested_mode() {
        let mut acc = MetricsAccumulator::new();
        acc.push(Mode::Train, "kl", 0.5);
        acc.push(Mode::Eval, "kl", 0.25);

        let drained = acc.drain(Mode::Train);
        assert_eq!(drained["train.kl"], 0.5);
        assert_eq!(acc.count(Mode::Train, "kl"), 0);
        assert_eq!(acc.count(Mode::Eval, "kl"), 1);
    }
}
