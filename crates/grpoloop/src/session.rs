//! Training-session orchestration: rollout, scoring, advantages and loss.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::advantage::estimate_advantages;
use crate::config::GrpoConfig;
use crate::distributed::{gather_object, Collective};
use crate::infer::{ChatChoice, ChatMessage, InferenceEngine, StopReason};
use crate::log::{CompletionLog, CompletionRecord};
use crate::loss::{clipped_policy_loss, LossInputs};
use crate::metrics::{Mode, MetricsAccumulator};
use crate::model::{OptimizerHandle, TrainableModel};
use crate::reward::{score_batch, RewardFunction};
use crate::rollout::RolloutCoordinator;
use crate::sync::WeightShard;
use crate::{GrpoError, Result};

/// One training prompt, optionally with a reference solution for scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub messages: Vec<ChatMessage>,
    pub solution: Option<String>,
}

impl Example {
    pub fn from_prompt(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            solution: None,
        }
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    /// The prompt text shown to the model, for logging.
    pub fn prompt_text(&self) -> &str {
        self.messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or("")
    }
}

/// This rank's completions for one step, scored and ready for the loss.
///
/// Entries are in group order: `num_generations` consecutive completions per
/// prompt.
#[derive(Debug)]
pub struct ScoredBatch {
    pub examples: Vec<Example>,
    pub completions: Vec<ChatChoice>,
    pub rewards: Vec<f32>,
    pub advantages: Vec<f32>,
}

/// A full group-relative policy optimization session.
///
/// Owns the rollout coordinator, the reward functions and the running
/// metrics. One instance per rank; collective calls inside must line up
/// across ranks.
pub struct GrpoSession {
    config: GrpoConfig,
    collective: Arc<dyn Collective>,
    coordinator: RolloutCoordinator,
    reward_functions: Vec<RewardFunction>,
    metrics: MetricsAccumulator,
    completion_log: Option<CompletionLog>,
}

impl std::fmt::Debug for GrpoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpoSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GrpoSession {
    pub fn new(
        config: GrpoConfig,
        collective: Arc<dyn Collective>,
        engine: Option<Arc<Mutex<dyn InferenceEngine>>>,
        shards: Vec<WeightShard>,
        reward_functions: Vec<RewardFunction>,
    ) -> Result<Self> {
        if reward_functions.is_empty() {
            return Err(GrpoError::Config(
                "at least one reward function is required".to_string(),
            ));
        }
        if let Some(weights) = &config.reward_weights {
            if weights.len() != reward_functions.len() {
                return Err(GrpoError::Config(format!(
                    "{} reward weights for {} reward functions",
                    weights.len(),
                    reward_functions.len()
                )));
            }
        }

        let coordinator = RolloutCoordinator::new(
            config.clone(),
            Arc::clone(&collective),
            engine,
            shards,
        )?;
        Ok(Self {
            config,
            collective,
            coordinator,
            reward_functions,
            metrics: MetricsAccumulator::new(),
            completion_log: None,
        })
    }

    /// Attach a jsonl completion log. Only rank 0 actually writes; other
    /// ranks silently drop the attachment.
    pub fn with_completion_log(mut self, log: CompletionLog) -> Self {
        if self.collective.rank() == 0 {
            self.completion_log = Some(log);
        }
        self
    }

    pub fn coordinator(&mut self) -> &mut RolloutCoordinator {
        &mut self.coordinator
    }

    pub fn metrics(&mut self) -> &mut MetricsAccumulator {
        &mut self.metrics
    }

    /// Generate `num_generations` completions per prompt, score them and
    /// compute group-relative advantages.
    ///
    /// Advantages are estimated over the globally gathered rewards, so groups
    /// that span process boundaries are handled the same as local ones.
    pub fn generate_and_score(
        &mut self,
        step: u64,
        model: &mut dyn TrainableModel,
        optimizer: &mut dyn OptimizerHandle,
        prompts: Vec<Example>,
    ) -> Result<ScoredBatch> {
        let group = self.config.num_generations;
        let mut repeated = Vec::with_capacity(prompts.len() * group);
        for prompt in prompts {
            for _ in 0..group {
                repeated.push(prompt.clone());
            }
        }

        let (examples, outputs) = self
            .coordinator
            .generate(step, model, optimizer, repeated)?;

        let mut completions = Vec::with_capacity(outputs.len());
        let mut texts = Vec::with_capacity(outputs.len());
        let mut clipped = 0usize;
        let mut token_total = 0usize;
        for output in outputs {
            let choice = output.choices.into_iter().next().ok_or_else(|| {
                GrpoError::Protocol("engine returned an output with no choices".to_string())
            })?;
            if choice.stop_reason == StopReason::Length {
                clipped += 1;
            }
            token_total += choice.token_ids.len();
            texts.push(choice.message.content.clone());
            completions.push(choice);
        }

        let report = score_batch(
            &mut self.reward_functions,
            &examples,
            &texts,
            self.config.reward_weights.as_deref(),
        )?;
        let rewards = report.total.clone();

        let global_rewards = gather_object(self.collective.as_ref(), &rewards)?;
        let global_advantages = estimate_advantages(&global_rewards, group)?;
        let start = self.collective.rank() * rewards.len();
        if start + rewards.len() > global_advantages.advantages.len() {
            return Err(GrpoError::Protocol(format!(
                "rank {} expected advantages [{}, {}) but only {} exist",
                self.collective.rank(),
                start,
                start + rewards.len(),
                global_advantages.advantages.len()
            )));
        }
        let advantages = global_advantages.advantages[start..start + rewards.len()].to_vec();

        let count = completions.len().max(1) as f64;
        self.metrics
            .push(Mode::Train, "completion_length", token_total as f64 / count);
        self.metrics.push(
            Mode::Train,
            "reward",
            rewards.iter().map(|&r| r as f64).sum::<f64>() / count,
        );
        for (name, mean) in report.mean_per_function() {
            self.metrics
                .push(Mode::Train, &format!("rewards/{}", name), mean);
        }
        self.metrics.push(
            Mode::Train,
            "max_advantage",
            global_advantages.mean_max_abs(),
        );
        self.metrics
            .push(Mode::Train, "response_clip_ratio", clipped as f64 / count);

        if let Some(log) = &mut self.completion_log {
            let records: Vec<CompletionRecord> = examples
                .iter()
                .zip(&texts)
                .zip(&rewards)
                .map(|((example, text), &reward)| CompletionRecord {
                    step,
                    prompt: example.prompt_text().to_string(),
                    completion: text.clone(),
                    reward: reward as f64,
                })
                .collect();
            log.append(&records)?;
        }

        Ok(ScoredBatch {
            examples,
            completions,
            rewards,
            advantages,
        })
    }

    /// Clipped surrogate loss over one micro-batch of log-probabilities.
    pub fn compute_loss(&mut self, inputs: LossInputs<'_>, mode: Mode) -> Result<tch::Tensor> {
        clipped_policy_loss(
            inputs,
            self.config.num_generations as i64,
            self.config.epsilon,
            self.config.beta,
            &mut self.metrics,
            mode,
            false,
        )
    }

    /// Drain the accumulated metrics for `mode` into a logger backend.
    pub fn log_metrics(&mut self, logger: &dyn crate::log::MetricLogger, step: u64, mode: Mode) {
        let reduced = self.metrics.drain(mode);
        if !reduced.is_empty() {
            logger.log_metrics(&reduced, step);
        }
    }
}
