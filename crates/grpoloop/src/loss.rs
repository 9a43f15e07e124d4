//! Clipped policy-gradient loss with advantage gating.

use tch::{Kind, Tensor};

use crate::metrics::{Mode, MetricsAccumulator};
use crate::{GrpoError, Result};

/// Prompt groups whose max |advantage| falls below this threshold contribute
/// zero loss. This keeps near-zero-signal groups from steering the gradient
/// through noise. Note this gate and the valid-group rescale below are not
/// part of the canonical GRPO objective.
pub const ADVANTAGE_GATE: f64 = 0.1;

/// Per-token log-probability inputs for one optimizer step.
///
/// All tensors are `[batch, completion_len]` except `advantages`, which is
/// `[batch]`. `old_logps` is `None` on the single-iteration path, where the
/// detached current log-probs stand in for the rollout policy. `ref_logps` is
/// only consulted when the KL coefficient is nonzero.
pub struct LossInputs<'a> {
    pub logps: &'a Tensor,
    pub old_logps: Option<&'a Tensor>,
    pub ref_logps: Option<&'a Tensor>,
    pub advantages: &'a Tensor,
    pub completion_mask: &'a Tensor,
}

/// Compute the clipped surrogate loss over grouped completions.
///
/// Groups advantages by prompt, gates out groups below [`ADVANTAGE_GATE`],
/// computes `-min(r * A, clip(r) * A)` per token with ratio
/// `r = exp(logp - old_logp)` clipped to `[1-epsilon, 1+epsilon]`, adds
/// `beta * (exp(ref - cur) - (ref - cur) - 1)` when `beta != 0`, averages over
/// valid mask entries and rescales by `total_groups / valid_groups`. When every
/// group is gated the loss is exactly zero.
///
/// Records `kl` and `clip_ratio` observations on `metrics`.
pub fn clipped_policy_loss(
    inputs: LossInputs<'_>,
    generations_per_prompt: i64,
    epsilon: f64,
    beta: f64,
    metrics: &mut MetricsAccumulator,
    mode: Mode,
    return_outputs: bool,
) -> Result<Tensor> {
    if return_outputs {
        return Err(GrpoError::Protocol(
            "the GRPO loss does not support returning auxiliary outputs".to_string(),
        ));
    }

    let advantages = inputs.advantages;
    let device = advantages.device();
    let batch_size = advantages.size1()?;
    if generations_per_prompt < 2 || batch_size % generations_per_prompt != 0 {
        return Err(GrpoError::Config(format!(
            "batch of {} cannot be grouped into prompts of {} generations",
            batch_size, generations_per_prompt
        )));
    }
    let num_prompts = batch_size / generations_per_prompt;

    // Gate prompt groups on their strongest advantage signal.
    let grouped = advantages.view([num_prompts, generations_per_prompt]);
    let (max_abs, _) = grouped.abs().max_dim(1, false);
    let valid_prompts = max_abs.ge(ADVANTAGE_GATE);
    let num_valid = valid_prompts
        .to_kind(Kind::Float)
        .sum(Kind::Float)
        .double_value(&[]) as i64;

    if num_valid == 0 {
        return Ok(Tensor::zeros([], (Kind::Float, device)));
    }

    let valid_examples = valid_prompts
        .to_kind(Kind::Float)
        .repeat_interleave_self_int(generations_per_prompt, 0, None);
    let masked_advantages = advantages * &valid_examples;
    let filtered_mask = inputs.completion_mask.to_kind(Kind::Float) * valid_examples.unsqueeze(1);

    let old_logps = match inputs.old_logps {
        Some(old) => old.shallow_clone(),
        None => inputs.logps.detach(),
    };

    let coef_1 = (inputs.logps - &old_logps).exp();
    let coef_2 = coef_1.clamp(1.0 - epsilon, 1.0 + epsilon);
    let adv_col = masked_advantages.unsqueeze(1);
    let per_token_loss1 = &coef_1 * &adv_col;
    let per_token_loss2 = &coef_2 * &adv_col;
    let mut per_token_loss = per_token_loss1.min_other(&per_token_loss2).neg();

    let per_token_kl = if beta != 0.0 {
        let ref_logps = inputs.ref_logps.ok_or_else(|| {
            GrpoError::Config(
                "a nonzero KL coefficient requires reference log-probabilities".to_string(),
            )
        })?;
        // exp(x) - x - 1 >= 0, a numerically stable KL estimator.
        let diff = ref_logps - inputs.logps;
        let kl = diff.exp() - &diff - 1.0;
        per_token_loss = per_token_loss + beta * &kl;
        Some(kl)
    } else {
        None
    };

    let denom = filtered_mask.sum(Kind::Float);
    let denom_val = denom.double_value(&[]);
    let loss = if denom_val > 0.0 {
        let rescale = num_prompts as f64 / num_valid as f64;
        (&per_token_loss * &filtered_mask).sum(Kind::Float) / &denom * rescale
    } else {
        Tensor::zeros([], (Kind::Float, device))
    };

    if denom_val > 0.0 {
        if let Some(kl) = per_token_kl {
            let mean_kl = (&kl * &filtered_mask).sum(Kind::Float).double_value(&[]) / denom_val;
            metrics.push(mode, "kl", mean_kl);
        }
        // One-sided diagnostic: counts tokens whose unclipped objective falls
        // below the clipped one.
        let is_clipped = per_token_loss1.lt_tensor(&per_token_loss2).to_kind(Kind::Float);
        let clip_ratio =
            (&is_clipped * &filtered_mask).sum(Kind::Float).double_value(&[]) / denom_val;
        metrics.push(mode, "clip_ratio", clip_ratio);
    }

    Ok(loss)
}
