//! Traits the weight-sync machinery needs from the training-side model.

use std::collections::BTreeMap;
use tch::{Device, Tensor};

use crate::{GrpoError, Result};

/// Training-side view of the policy model.
///
/// The model architecture itself is owned by the outer training loop; weight
/// synchronization only needs named parameters, an adapter-merged view of a
/// parameter subset, and the ability to move submodules between devices.
pub trait TrainableModel {
    /// Names of all trainable parameters, in deterministic order.
    fn parameter_names(&self) -> Vec<String>;

    /// Merged state of the requested parameters, with any low-rank-adapter
    /// deltas folded into the base weights. Must not mutate the model.
    fn merge_subset(&self, names: &[String]) -> Result<Vec<(String, Tensor)>>;

    /// Submodules and the device each currently lives on.
    fn submodule_devices(&self) -> Vec<(String, Device)>;

    /// Move one submodule to `device`.
    fn move_submodule(&mut self, name: &str, device: Device) -> Result<()>;
}

/// Optimizer per-parameter state, for offload/restore.
pub trait OptimizerHandle {
    /// State tensors and the device each currently lives on.
    fn state_devices(&self) -> Vec<(String, Device)>;

    /// Move one state tensor to `device`.
    fn move_state(&mut self, name: &str, device: Device) -> Result<()>;
}

/// A low-rank adapter attached to one base weight.
#[derive(Debug)]
pub struct LoraAdapter {
    pub a: Tensor,
    pub b: Tensor,
    pub scaling: f64,
}

impl LoraAdapter {
    /// Delta to fold into the base weight: `scaling * B @ A`.
    fn delta(&self, device: Device) -> Tensor {
        (self.b.to_device(device).matmul(&self.a.to_device(device))) * self.scaling
    }
}

/// Name-to-tensor model backing, the reference [`TrainableModel`].
///
/// Each parameter is its own movable submodule. Suitable for tests and for
/// models whose training wrapper exposes a flat state dict.
#[derive(Debug, Default)]
pub struct TensorMapModel {
    params: BTreeMap<String, Tensor>,
    adapters: BTreeMap<String, LoraAdapter>,
}

impl TensorMapModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.params.insert(name.into(), tensor);
    }

    /// Attach a low-rank adapter to an existing base parameter.
    pub fn attach_adapter(&mut self, base_name: impl Into<String>, adapter: LoraAdapter) {
        self.adapters.insert(base_name.into(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name)
    }
}

impl TrainableModel for TensorMapModel {
    fn parameter_names(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    fn merge_subset(&self, names: &[String]) -> Result<Vec<(String, Tensor)>> {
        let mut merged = Vec::with_capacity(names.len());
        for name in names {
            let base = self.params.get(name).ok_or_else(|| {
                GrpoError::Protocol(format!("unknown parameter in weight shard: {}", name))
            })?;
            let tensor = match self.adapters.get(name) {
                Some(adapter) => base + adapter.delta(base.device()),
                None => base.detach().shallow_clone(),
            };
            merged.push((name.clone(), tensor));
        }
        Ok(merged)
    }

    fn submodule_devices(&self) -> Vec<(String, Device)> {
        self.params
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.device()))
            .collect()
    }

    fn move_submodule(&mut self, name: &str, device: Device) -> Result<()> {
        let tensor = self.params.get(name).ok_or_else(|| {
            GrpoError::Protocol(format!("cannot move unknown submodule: {}", name))
        })?;
        let moved = tensor.to_device(device);
        self.params.insert(name.to_string(), moved);
        Ok(())
    }
}

/// Flat optimizer-state backing, the reference [`OptimizerHandle`].
#[derive(Debug, Default)]
pub struct TensorMapOptimizer {
    state: BTreeMap<String, Tensor>,
}

impl TensorMapOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.state.insert(name.into(), tensor);
    }
}

impl OptimizerHandle for TensorMapOptimizer {
    fn state_devices(&self) -> Vec<(String, Device)> {
        self.state
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.device()))
            .collect()
    }

    fn move_state(&mut self, name: &str, device: Device) -> Result<()> {
        let tensor = self.state.get(name).ok_or_else(|| {
            GrpoError::Protocol(format!("cannot move unknown optimizer state: {}", name))
        })?;
        let moved = tensor.to_device(device);
        self.state.insert(name.to_string(), moved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn merge_subset_folds_adapter_delta() {
        let mut model = TensorMapModel::new();
        model.insert(
            "layers.0.weight",
            Tensor::ones([2, 2], (Kind::Float, Device::Cpu)),
        );
        model.attach_adapter(
            "layers.0.weight",
            LoraAdapter {
                a: Tensor::ones([1, 2], (Kind::Float, Device::Cpu)),
                b: Tensor::ones([2, 1], (Kind::Float, Device::Cpu)),
                scaling: 0.5,
            },
        );

        let merged = model.merge_subset(&["layers.0.weight".to_string()]).unwrap();
        assert_eq!(merged.len(), 1);
        // base 1.0 + 0.5 * (B @ A = 1.0) everywhere
        let expected = 1.5f64;
        let value = merged[0].1.mean(Kind::Float).double_value(&[]);
        assert!((value - expected).abs() < 1e-6);

        // The base weight itself must be untouched.
        let base = model.get("layers.0.weight").unwrap();
        assert!((base.mean(Kind::Float).double_value(&[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn merge_subset_rejects_unknown_names() {
        let model = TensorMapModel::new();
        let err = model.merge_subset(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, GrpoError::Protocol(_)));
    }
}
