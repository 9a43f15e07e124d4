//! Completion parsing helpers and per-question accuracy tracking.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{GrpoError, Result};

/// Extract the content of the last `\boxed{...}` in `text`, honoring nested
/// braces. Returns `None` when no complete boxed expression is present.
pub fn extract_boxed_answer(text: &str) -> Option<String> {
    let start = text.rfind("\\boxed{")? + "\\boxed{".len();
    let mut depth = 1usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Substitute the reference solution for the longest incorrect completion in
/// every group that produced no correct one. Groups without a reference
/// solution are left alone. Returns the indices that were replaced.
///
/// `correct` and `solutions` are per completion; the solution is constant
/// within a group.
pub fn replace_unsolved_groups(
    completions: &mut [String],
    correct: &[bool],
    solutions: &[Option<String>],
    generations_per_prompt: usize,
) -> Result<Vec<usize>> {
    if generations_per_prompt == 0
        || completions.len() % generations_per_prompt != 0
        || completions.len() != correct.len()
        || completions.len() != solutions.len()
    {
        return Err(GrpoError::Config(format!(
            "{} completions ({} correctness flags, {} solutions) cannot form groups of {}",
            completions.len(),
            correct.len(),
            solutions.len(),
            generations_per_prompt
        )));
    }

    let mut replaced = Vec::new();
    for group_start in (0..completions.len()).step_by(generations_per_prompt) {
        let group = group_start..group_start + generations_per_prompt;
        if group.clone().any(|i| correct[i]) {
            continue;
        }
        let Some(solution) = solutions[group_start].as_ref() else {
            continue;
        };
        if let Some(longest) = group.max_by_key(|&i| completions[i].len()) {
            completions[longest] = solution.clone();
            replaced.push(longest);
        }
    }
    Ok(replaced)
}

#[derive(Clone, Debug, Default)]
struct QuestionStats {
    attempts: u64,
    correct: u64,
    reward_sum: f64,
}

/// Accumulates per-question solve statistics across a run and dumps them as
/// csv for offline inspection.
///
/// Questions are keyed by their prompt text, so two distinct questions with
/// identical text share one row.
#[derive(Debug, Default)]
pub struct SolutionTracker {
    stats: BTreeMap<String, QuestionStats>,
}

impl SolutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question: &str, correct: bool, reward: f64) {
        let entry = self.stats.entry(question.to_string()).or_default();
        entry.attempts += 1;
        if correct {
            entry.correct += 1;
        }
        entry.reward_sum += reward;
    }

    pub fn num_questions(&self) -> usize {
        self.stats.len()
    }

    /// Fraction of attempts solved, over all questions.
    pub fn overall_accuracy(&self) -> f64 {
        let attempts: u64 = self.stats.values().map(|s| s.attempts).sum();
        if attempts == 0 {
            return 0.0;
        }
        let correct: u64 = self.stats.values().map(|s| s.correct).sum();
        correct as f64 / attempts as f64
    }

    /// Write one row per question: text, attempts, solves, accuracy, mean
    /// reward.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::other)?;
        writer
            .write_record(["question", "attempts", "correct", "accuracy", "mean_reward"])
            .map_err(std::io::Error::other)?;
        for (question, stats) in &self.stats {
            let accuracy = stats.correct as f64 / stats.attempts.max(1) as f64;
            let mean_reward = stats.reward_sum / stats.attempts.max(1) as f64;
            writer
                .write_record([
                    question.as_str(),
                    &stats.attempts.to_string(),
                    &stats.correct.to_string(),
                    &format!("{:.4}", accuracy),
                    &format!("{:.4}", mean_reward),
                ])
                .map_err(std::io::Error::other)?;
        }
        writer.flush()?;
        Ok(())
    }
}
