//! Partitioning the parameter set into weight shards.

use crate::{GrpoError, Result};

/// Architecture hints for shard planning.
///
/// Multimodal models carry vision towers and projectors next to the language
/// model; only the submodule under `language_model_prefix` has a repeated
/// layer stack worth splitting. `None` means the whole model is the language
/// model.
#[derive(Clone, Debug, Default)]
pub struct ModelArch {
    pub language_model_prefix: Option<String>,
}

/// One batch of parameter names pushed to the inference engine as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightShard {
    /// Training-side parameter names (adapter wrappers included).
    pub names: Vec<String>,
}

/// Layer index of a parameter, read from its first all-digit path segment
/// (`model.layers.17.mlp.up_proj.weight` -> 17).
fn layer_index(name: &str) -> Option<usize> {
    name.split('.').find_map(|segment| segment.parse().ok())
}

/// Engine-side name for a training-side parameter.
///
/// Adapter-only parameters have no counterpart in the merged weights and map
/// to `None`; wrapper prefixes introduced by adapter tuning are stripped.
pub fn normalize_parameter_name(name: &str) -> Option<String> {
    if name.contains("lora_") || name.contains("original_module") {
        return None;
    }
    let name = name.strip_prefix("base_model.model.").unwrap_or(name);
    let name = name.replace(".base_layer", "").replace("modules_to_save.default.", "");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn is_language_model(name: &str, arch: &ModelArch) -> bool {
    match &arch.language_model_prefix {
        None => true,
        Some(prefix) => name
            .strip_prefix("base_model.")
            .unwrap_or(name)
            .starts_with(prefix.as_str()),
    }
}

/// Assign every trainable parameter to a shard.
///
/// The language model's layer stack is split into `max_batches` contiguous
/// groups of `ceil(layer_count / max_batches)` layers; parameters without a
/// layer index (embeddings, heads) form one trailing shard and parameters
/// outside the language model another. Reference-model parameters are never
/// synchronized and are skipped entirely. `max_batches == None` puts
/// everything in a single shard.
pub fn plan_shards(
    parameter_names: &[String],
    max_batches: Option<usize>,
    arch: &ModelArch,
) -> Result<Vec<WeightShard>> {
    let trainable: Vec<&String> = parameter_names
        .iter()
        .filter(|name| !name.contains("ref_model"))
        .collect();

    let Some(max_batches) = max_batches else {
        return Ok(vec![WeightShard {
            names: trainable.into_iter().cloned().collect(),
        }]);
    };
    if max_batches == 0 {
        return Err(GrpoError::Config(
            "move_model_batches must be at least 1".to_string(),
        ));
    }

    let mut layered: Vec<(usize, &String)> = Vec::new();
    let mut embeds: Vec<String> = Vec::new();
    let mut non_llm: Vec<String> = Vec::new();

    for name in &trainable {
        if !is_language_model(name, arch) {
            non_llm.push((*name).clone());
        } else if let Some(idx) = layer_index(name) {
            layered.push((idx, name));
        } else {
            embeds.push((*name).clone());
        }
    }

    let layer_count = layered
        .iter()
        .map(|(idx, _)| idx + 1)
        .max()
        .ok_or_else(|| {
            GrpoError::Config(
                "cannot find a repeated layer stack to split; unsupported architecture".to_string(),
            )
        })?;
    let layers_per_shard = layer_count.div_ceil(max_batches);

    let mut groups: Vec<Vec<String>> = vec![Vec::new(); max_batches];
    for (idx, name) in layered {
        groups[idx / layers_per_shard].push(name.clone());
    }

    let mut shards: Vec<WeightShard> = groups
        .into_iter()
        .filter(|names| !names.is_empty())
        .map(|names| WeightShard { names })
        .collect();
    if !embeds.is_empty() {
        shards.push(WeightShard { names: embeds });
    }
    if !non_llm.is_empty() {
        shards.push(WeightShard { names: non_llm });
    }
    Ok(shards)
}
