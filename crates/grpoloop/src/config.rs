//! Run configuration and validation.

use serde::{Deserialize, Serialize};

use crate::distributed::ProcessTopology;
use crate::infer::RequestConfig;
use crate::{GrpoError, Result};

/// Configuration for a group-relative policy optimization run.
///
/// Sampling fields are forwarded to the inference engine verbatim; the rest
/// shape batching, loss and the training/inference device split. Invalid
/// combinations are rejected by [`GrpoConfig::validate`] before any rollout
/// work starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrpoConfig {
    /// Completions sampled per prompt (the group size).
    pub num_generations: usize,
    /// Completions processed per rank per step.
    pub per_device_batch: usize,
    /// Clipping range for the probability ratio.
    pub epsilon: f64,
    /// KL regularization coefficient; 0 disables the reference model term.
    pub beta: f64,
    /// Optimizer updates per rollout batch.
    pub num_iterations: usize,

    /// Inference engine instances per node.
    pub num_infer_workers: usize,
    /// Engine instances cooperating on one request via tensor parallelism.
    pub tensor_parallel_size: usize,
    /// Overlap generation for the next step with training on the current one.
    pub async_generate: bool,
    /// Engine sleep level between generations; 0 keeps it resident.
    pub sleep_level: u8,
    /// Move model weights to host memory while the engine is awake.
    pub offload_model: bool,
    /// Move optimizer state to host memory while the engine is awake.
    pub offload_optimizer: bool,
    /// Split weight pushes into this many layer batches; `None` pushes the
    /// whole model at once.
    pub move_model_batches: Option<usize>,

    /// Per-function weights for the scalar reward; `None` weights equally.
    pub reward_weights: Option<Vec<f64>>,

    pub max_completion_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub repetition_penalty: f64,
    pub stop_words: Vec<String>,
    pub seed: Option<u64>,

    /// Append sampled completions to a jsonl file on rank 0.
    pub log_completions: bool,
}

impl Default for GrpoConfig {
    fn default() -> Self {
        Self {
            num_generations: 8,
            per_device_batch: 8,
            epsilon: 0.2,
            beta: 0.04,
            num_iterations: 1,
            num_infer_workers: 1,
            tensor_parallel_size: 1,
            async_generate: false,
            sleep_level: 0,
            offload_model: false,
            offload_optimizer: false,
            move_model_batches: None,
            reward_weights: None,
            max_completion_tokens: 512,
            temperature: 1.0,
            top_p: 1.0,
            top_k: 50,
            repetition_penalty: 1.0,
            stop_words: Vec::new(),
            seed: None,
            log_completions: false,
        }
    }
}

impl GrpoConfig {
    pub fn with_num_generations(mut self, num_generations: usize) -> Self {
        self.num_generations = num_generations;
        self
    }

    pub fn with_per_device_batch(mut self, per_device_batch: usize) -> Self {
        self.per_device_batch = per_device_batch;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_async_generate(mut self, async_generate: bool) -> Self {
        self.async_generate = async_generate;
        self
    }

    pub fn with_infer_workers(mut self, num_infer_workers: usize) -> Self {
        self.num_infer_workers = num_infer_workers;
        self
    }

    pub fn with_tensor_parallel(mut self, tensor_parallel_size: usize) -> Self {
        self.tensor_parallel_size = tensor_parallel_size;
        self
    }

    /// Number of prompts this rank contributes per step.
    pub fn prompts_per_rank(&self) -> usize {
        self.per_device_batch / self.num_generations.max(1)
    }

    /// Engine workers across the whole job.
    pub fn total_infer_workers(&self, topology: &ProcessTopology) -> usize {
        self.num_infer_workers * topology.num_nodes
    }

    /// Sampling parameters for one generation round.
    ///
    /// On the tensor-parallel path every replica in a group runs the same
    /// combined batch, so they must all sample with the same per-step seed to
    /// produce identical outputs.
    pub fn request_config(&self, step: u64) -> RequestConfig {
        let mut request = RequestConfig {
            max_tokens: self.max_completion_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            stop: self.stop_words.clone(),
            n: 1,
            seed: self.seed,
        };
        if self.tensor_parallel_size > 1 {
            request.seed = Some(self.seed.unwrap_or(0).wrapping_add(step));
        }
        request
    }

    /// Reject configurations the rollout and loss machinery cannot serve.
    pub fn validate(&self, topology: &ProcessTopology) -> Result<()> {
        if self.num_generations < 2 {
            return Err(GrpoError::Config(format!(
                "num_generations must be at least 2 for group-relative advantages, got {}",
                self.num_generations
            )));
        }
        let global_batch = self.per_device_batch * topology.world_size;
        if global_batch % self.num_generations != 0 {
            return Err(GrpoError::Config(format!(
                "global batch {} ({} per device x {} processes) is not divisible by \
                 num_generations {}",
                global_batch, self.per_device_batch, topology.world_size, self.num_generations
            )));
        }
        if self.epsilon <= 0.0 {
            return Err(GrpoError::Config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.beta < 0.0 {
            return Err(GrpoError::Config(format!(
                "beta must be non-negative, got {}",
                self.beta
            )));
        }
        if self.num_iterations == 0 {
            return Err(GrpoError::Config(
                "num_iterations must be at least 1".to_string(),
            ));
        }
        if self.num_infer_workers == 0 {
            return Err(GrpoError::Config(
                "num_infer_workers must be at least 1".to_string(),
            ));
        }
        if self.tensor_parallel_size == 0
            || self.num_infer_workers % self.tensor_parallel_size != 0
        {
            return Err(GrpoError::Config(format!(
                "tensor_parallel_size {} must divide num_infer_workers {}",
                self.tensor_parallel_size, self.num_infer_workers
            )));
        }
        if let Some(batches) = self.move_model_batches {
            if batches == 0 {
                return Err(GrpoError::Config(
                    "move_model_batches must be at least 1".to_string(),
                ));
            }
        }
        if self.async_generate && (self.sleep_level > 0 || self.offload_model || self.offload_optimizer)
        {
            return Err(GrpoError::Config(
                "async_generate cannot be combined with engine sleep or memory offload"
                    .to_string(),
            ));
        }
        if self.async_generate && self.num_iterations != 1 {
            return Err(GrpoError::Config(
                "async_generate requires num_iterations == 1".to_string(),
            ));
        }
        if self.num_infer_workers > topology.device_count {
            return Err(GrpoError::Config(format!(
                "num_infer_workers {} exceeds the {} visible devices",
                self.num_infer_workers, topology.device_count
            )));
        }
        if topology.local_world_size + self.num_infer_workers > topology.device_count {
            tracing::warn!(
                training = topology.local_world_size,
                inference = self.num_infer_workers,
                devices = topology.device_count,
                "inference engines share devices with training processes; \
                 enable sleep_level or offload to avoid running out of memory"
            );
        }
        Ok(())
    }
}
