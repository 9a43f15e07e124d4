//! Weight synchronization between training processes and the inference
//! engine.
//!
//! Provides:
//! - `plan_shards` - partition the parameter set into contiguous layer groups
//! - `WeightSyncEngine` - step-gated weight push plus memory offload ledgers

mod engine;
mod shards;

pub use engine::WeightSyncEngine;
pub use shards::{normalize_parameter_name, plan_shards, ModelArch, WeightShard};
