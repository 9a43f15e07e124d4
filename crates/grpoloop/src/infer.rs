//! Contract for the external fast-inference collaborator.

use serde::{Deserialize, Serialize};
use tch::Tensor;

use crate::Result;

/// One role/content turn of a chat prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A single generation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferRequest {
    pub messages: Vec<ChatMessage>,
}

/// Sampling parameters forwarded verbatim to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestConfig {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub repetition_penalty: f64,
    pub stop: Vec<String>,
    /// Completions per request; above 1 only on the tensor-parallel path.
    pub n: usize,
    pub seed: Option<u64>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 1.0,
            top_p: 1.0,
            top_k: 50,
            repetition_penalty: 1.0,
            stop: Vec::new(),
            n: 1,
            seed: None,
        }
    }
}

/// Why the engine stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A stop token or stop word was produced.
    Stop,
    /// The max-token budget was exhausted.
    Length,
}

/// One candidate completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    pub token_ids: Vec<i64>,
    pub stop_reason: StopReason,
}

/// Engine response for one request, in request order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferOutput {
    pub choices: Vec<ChatChoice>,
}

/// The fast-inference engine, treated as a black box.
///
/// Implementations must preserve request order in `infer` and support the
/// externally driven weight-reload and sleep/wake lifecycle. Sleeping releases
/// the engine's device memory so training compute can use it; `load_weights`
/// replaces a named subset of the loaded model's parameters in place.
pub trait InferenceEngine: Send {
    fn infer(&mut self, requests: &[InferRequest], config: &RequestConfig)
        -> Result<Vec<InferOutput>>;

    fn load_weights(&mut self, weights: Vec<(String, Tensor)>) -> Result<()>;

    fn sleep(&mut self, level: u8);

    fn wake_up(&mut self);

    fn is_sleeping(&self) -> bool {
        false
    }
}
