//! Leave-one-out group-relative advantage estimation.

use crate::{GrpoError, Result};

/// Advantages for one batch of grouped rewards.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupAdvantages {
    /// Per-example advantage, same length and order as the input rewards.
    pub advantages: Vec<f32>,
    /// Per-group `max(|advantage|)`, used as a diagnostic and by the loss gate.
    pub max_abs_per_group: Vec<f32>,
}

impl GroupAdvantages {
    /// Mean of the per-group max absolute advantages.
    pub fn mean_max_abs(&self) -> f64 {
        if self.max_abs_per_group.is_empty() {
            return 0.0;
        }
        self.max_abs_per_group.iter().map(|&v| v as f64).sum::<f64>()
            / self.max_abs_per_group.len() as f64
    }
}

/// Compute leave-one-out advantages over groups of `generations_per_prompt`
/// rewards.
///
/// For each member `i` of a group, `advantage[i] = reward[i] - mean(reward[j]
/// for j != i)`. Unlike mean/std normalization this never divides by a
/// near-zero spread; the cost is somewhat higher variance.
///
/// Rewards must reshape exactly into groups of `generations_per_prompt`.
pub fn estimate_advantages(
    rewards: &[f32],
    generations_per_prompt: usize,
) -> Result<GroupAdvantages> {
    if generations_per_prompt < 2 {
        return Err(GrpoError::Config(format!(
            "generations_per_prompt must be at least 2, got {}",
            generations_per_prompt
        )));
    }
    if rewards.is_empty() || rewards.len() % generations_per_prompt != 0 {
        return Err(GrpoError::Config(format!(
            "{} rewards cannot be grouped into prompts of {} generations",
            rewards.len(),
            generations_per_prompt
        )));
    }

    let num_groups = rewards.len() / generations_per_prompt;
    let mut advantages = Vec::with_capacity(rewards.len());
    let mut max_abs_per_group = Vec::with_capacity(num_groups);

    for group in rewards.chunks_exact(generations_per_prompt) {
        let sum: f32 = group.iter().sum();
        let others = (generations_per_prompt - 1) as f32;
        let mut max_abs = 0.0f32;
        for &reward in group {
            let mean_others = (sum - reward) / others;
            let advantage = reward - mean_others;
            max_abs = max_abs.max(advantage.abs());
            advantages.push(advantage);
        }
        max_abs_per_group.push(max_abs);
    }

    Ok(GroupAdvantages {
        advantages,
        max_abs_per_group,
    })
}
