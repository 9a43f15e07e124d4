//! # grpoloop
//!
//! A GRPO (Group Relative Policy Optimization) fine-tuning loop for large
//! language models.
//!
//! ## Overview
//!
//! grpoloop provides:
//! - Rollout generation against a pluggable fast-inference engine
//! - Multi-function reward scoring with weighted aggregation
//! - Leave-one-out group-relative advantage estimation
//! - A clipped policy-gradient loss with optional KL penalty
//! - Weight synchronization from training processes into the inference
//!   engine, with adapter merging and memory offload
//! - Asynchronous double-buffered rollout prefetch
//!
//! The model architecture, optimizer, tokenization and the inference engine
//! itself are external collaborators; this crate owns the orchestration
//! between them.

pub mod advantage;
pub mod config;
pub mod diagnostics;
pub mod distribute;
pub mod distributed;
pub mod infer;
pub mod log;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod reward;
pub mod rollout;
pub mod session;
pub mod sync;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::advantage::{estimate_advantages, GroupAdvantages};
    pub use crate::config::GrpoConfig;
    pub use crate::distribute::DistributionPlan;
    pub use crate::distributed::{Collective, SingleProcess, ThreadCollective};
    pub use crate::infer::{
        ChatChoice, ChatMessage, InferOutput, InferRequest, InferenceEngine, RequestConfig,
    };
    pub use crate::log::{CompletionLog, CompositeLogger, ConsoleLogger, MetricLogger, NoOpLogger};
    pub use crate::loss::{clipped_policy_loss, LossInputs};
    pub use crate::metrics::{MetricsAccumulator, Mode};
    pub use crate::model::{OptimizerHandle, TrainableModel};
    pub use crate::reward::{RewardFunction, RewardModel, RewardReport, ScoringHead};
    pub use crate::rollout::{AsyncRolloutQueue, DataCache, RolloutCoordinator};
    pub use crate::session::{Example, GrpoSession, ScoredBatch};
    pub use crate::sync::{plan_shards, ModelArch, WeightShard, WeightSyncEngine};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum GrpoError {
    /// Invalid configuration, detected before training starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A component contract was violated at runtime.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The inference collaborator failed.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GrpoError>;
