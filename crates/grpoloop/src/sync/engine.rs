//! Step-gated weight push and device-memory offload.

use std::collections::HashMap;
use tch::Device;

use super::shards::{normalize_parameter_name, WeightShard};
use crate::infer::InferenceEngine;
use crate::model::{OptimizerHandle, TrainableModel};
use crate::{GrpoError, Result};

/// Keeps the inference engine's weights consistent with the training model
/// and arbitrates device memory between the two roles.
///
/// Weight pushes are gated on the global step so repeated calls within one
/// step are no-ops. Offload calls are idempotent: the ledger of original
/// devices is only populated on the first offload and drained on restore, so
/// `load_model` puts every submodule back exactly where it came from.
#[derive(Debug, Default)]
pub struct WeightSyncEngine {
    last_synced_step: Option<u64>,
    offload_modules: HashMap<String, Device>,
    offload_states: HashMap<String, Device>,
}

impl WeightSyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the engine's weights are stale for `step`.
    pub fn needs_sync(&self, step: u64) -> bool {
        self.last_synced_step != Some(step)
    }

    /// Push every shard's merged weights into the inference engine.
    ///
    /// Adapter deltas are folded in through the model's `merge_subset`, which
    /// leaves the training-side parameters untouched on every path, including
    /// errors. No-op when already synced at `step`.
    pub fn sync(
        &mut self,
        model: &dyn TrainableModel,
        engine: &mut dyn InferenceEngine,
        shards: &[WeightShard],
        step: u64,
    ) -> Result<()> {
        if !self.needs_sync(step) {
            return Ok(());
        }

        for shard in shards {
            let merged = model.merge_subset(&shard.names)?;
            let mut weights = Vec::with_capacity(merged.len());
            for (name, tensor) in merged {
                if tensor.numel() == 0 {
                    return Err(GrpoError::Protocol(format!(
                        "weight sync produced an empty tensor for {}",
                        name
                    )));
                }
                if let Some(load_name) = normalize_parameter_name(&name) {
                    weights.push((load_name, tensor));
                }
            }
            if weights.is_empty() {
                return Err(GrpoError::Protocol(
                    "weight shard resolved to no loadable tensors".to_string(),
                ));
            }
            engine.load_weights(weights)?;
        }

        self.last_synced_step = Some(step);
        tracing::debug!(step, shards = shards.len(), "weights pushed to inference engine");
        Ok(())
    }

    /// Record `step` as synced without pushing weights. Used by ranks that
    /// hold no inference engine so the step gate stays consistent everywhere.
    pub fn mark_synced(&mut self, step: u64) {
        self.last_synced_step = Some(step);
    }

    /// Move every submodule not already on host memory to the CPU.
    pub fn offload_model(&mut self, model: &mut dyn TrainableModel) -> Result<()> {
        if !self.offload_modules.is_empty() {
            return Ok(());
        }
        for (name, device) in model.submodule_devices() {
            if device != Device::Cpu {
                self.offload_modules.insert(name.clone(), device);
                model.move_submodule(&name, Device::Cpu)?;
            }
        }
        Ok(())
    }

    /// Restore offloaded submodules to their original devices.
    pub fn load_model(&mut self, model: &mut dyn TrainableModel) -> Result<()> {
        if self.offload_modules.is_empty() {
            return Ok(());
        }
        let placements: Vec<(String, Device)> = self.offload_modules.drain().collect();
        for (name, device) in placements {
            model.move_submodule(&name, device)?;
        }
        Ok(())
    }

    /// Move optimizer state tensors to host memory.
    pub fn offload_optimizer(&mut self, optimizer: &mut dyn OptimizerHandle) -> Result<()> {
        if !self.offload_states.is_empty() {
            return Ok(());
        }
        for (name, device) in optimizer.state_devices() {
            if device != Device::Cpu {
                self.offload_states.insert(name.clone(), device);
                optimizer.move_state(&name, Device::Cpu)?;
            }
        }
        Ok(())
    }

    /// Restore optimizer state tensors to their original devices.
    pub fn load_optimizer(&mut self, optimizer: &mut dyn OptimizerHandle) -> Result<()> {
        if self.offload_states.is_empty() {
            return Ok(());
        }
        let placements: Vec<(String, Device)> = self.offload_states.drain().collect();
        for (name, device) in placements {
            optimizer.move_state(&name, device)?;
        }
        Ok(())
    }
}
