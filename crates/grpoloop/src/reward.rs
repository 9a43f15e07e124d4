//! Reward scoring over sampled completions.

use ndarray::Array2;
use tch::{nn, nn::Module, Kind, Tensor};

use crate::diagnostics::extract_boxed_answer;
use crate::session::Example;
use crate::{GrpoError, Result};

/// Per-completion scorer backed by a plain function.
pub type RewardFn = Box<dyn Fn(&Example, &str) -> f64 + Send + Sync>;

/// Batch scorer backed by a learned model.
pub trait RewardModel: Send {
    fn score(&mut self, examples: &[Example], completions: &[String]) -> Result<Vec<f64>>;
}

/// One named reward source.
///
/// The tag makes the dispatch explicit: callables run per completion, models
/// score a whole batch at once.
pub enum RewardFunction {
    Callable { name: String, func: RewardFn },
    Model { name: String, model: Box<dyn RewardModel> },
}

impl RewardFunction {
    pub fn callable(
        name: impl Into<String>,
        func: impl Fn(&Example, &str) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self::Callable {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn model(name: impl Into<String>, model: Box<dyn RewardModel>) -> Self {
        Self::Model {
            name: name.into(),
            model,
        }
    }

    /// Binary accuracy against the example's reference solution, comparing
    /// the last boxed expression of the completion.
    pub fn accuracy() -> Self {
        Self::callable("accuracy", |example: &Example, completion: &str| {
            let Some(solution) = &example.solution else {
                return 0.0;
            };
            match extract_boxed_answer(completion) {
                Some(answer) if answer.trim() == solution.trim() => 1.0,
                _ => 0.0,
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Callable { name, .. } => name,
            Self::Model { name, .. } => name,
        }
    }

    fn score(&mut self, examples: &[Example], completions: &[String]) -> Result<Vec<f64>> {
        match self {
            Self::Callable { func, .. } => Ok(examples
                .iter()
                .zip(completions)
                .map(|(example, completion)| func(example, completion))
                .collect()),
            Self::Model { model, .. } => {
                let scores = model.score(examples, completions)?;
                if scores.len() != completions.len() {
                    return Err(GrpoError::Protocol(format!(
                        "reward model returned {} scores for {} completions",
                        scores.len(),
                        completions.len()
                    )));
                }
                Ok(scores)
            }
        }
    }
}

/// Feature encoder feeding a [`ScoringHead`]: one feature row per completion.
pub type FeatureEncoder = Box<dyn Fn(&[Example], &[String]) -> Result<Tensor> + Send>;

/// A learned scalar-per-completion scorer: a small MLP head over features
/// produced by an external encoder (the encoder owns tokenization and any
/// base-model forward pass).
pub struct ScoringHead {
    head: nn::Sequential,
    encoder: FeatureEncoder,
}

impl ScoringHead {
    pub fn new(vs: &nn::Path, feature_size: i64, hidden_size: i64, encoder: FeatureEncoder) -> Self {
        let head = nn::seq()
            .add(nn::linear(
                vs / "layer_0",
                feature_size,
                hidden_size,
                Default::default(),
            ))
            .add_fn(|x| x.relu())
            .add(nn::linear(vs / "layer_1", hidden_size, 1, Default::default()));
        Self { head, encoder }
    }
}

impl RewardModel for ScoringHead {
    fn score(&mut self, examples: &[Example], completions: &[String]) -> Result<Vec<f64>> {
        let features = (self.encoder)(examples, completions)?;
        let scores = self
            .head
            .forward(&features)
            .squeeze_dim(-1)
            .to_kind(Kind::Double);
        Ok(Vec::<f64>::try_from(&scores)?)
    }
}

/// Scores from every reward function plus their weighted combination.
#[derive(Clone, Debug)]
pub struct RewardReport {
    pub names: Vec<String>,
    /// Rows are reward functions, columns are completions.
    pub per_function: Array2<f64>,
    /// Weighted sum per completion.
    pub total: Vec<f32>,
}

impl RewardReport {
    /// Mean score of each reward function over the batch.
    pub fn mean_per_function(&self) -> Vec<(String, f64)> {
        self.names
            .iter()
            .enumerate()
            .map(|(row, name)| {
                let scores = self.per_function.row(row);
                let mean = scores.sum() / scores.len().max(1) as f64;
                (name.clone(), mean)
            })
            .collect()
    }
}

/// Run every reward function over the batch and combine the scores.
///
/// `weights` defaults to 1.0 per function; its length must match the number
/// of functions when given.
pub fn score_batch(
    functions: &mut [RewardFunction],
    examples: &[Example],
    completions: &[String],
    weights: Option<&[f64]>,
) -> Result<RewardReport> {
    if functions.is_empty() {
        return Err(GrpoError::Config(
            "at least one reward function is required".to_string(),
        ));
    }
    if examples.len() != completions.len() {
        return Err(GrpoError::Protocol(format!(
            "{} examples but {} completions to score",
            examples.len(),
            completions.len()
        )));
    }
    if let Some(weights) = weights {
        if weights.len() != functions.len() {
            return Err(GrpoError::Config(format!(
                "{} reward weights for {} reward functions",
                weights.len(),
                functions.len()
            )));
        }
    }

    let mut per_function = Array2::zeros((functions.len(), completions.len()));
    for (row, function) in functions.iter_mut().enumerate() {
        let scores = function.score(examples, completions)?;
        for (col, score) in scores.into_iter().enumerate() {
            per_function[[row, col]] = score;
        }
    }

    let total = (0..completions.len())
        .map(|col| {
            functions
                .iter()
                .enumerate()
                .map(|(row, _)| {
                    let weight = weights.map(|w| w[row]).unwrap_or(1.0);
                    weight * per_function[[row, col]]
                })
                .sum::<f64>() as f32
        })
        .collect();

    Ok(RewardReport {
        names: functions.iter().map(|f| f.name().to_string()).collect(),
        per_function,
        total,
    })
}
