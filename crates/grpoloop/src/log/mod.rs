//! Unified logging system.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends
//! - `ConsoleLogger` for lightweight stdout logging
//! - `CompletionLog` for appending sampled completions to a jsonl file
//! - `CompositeLogger` for multi-backend logging

mod completions;
mod console;
mod logger;

pub use completions::{CompletionLog, CompletionRecord};
pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MetricLogger, NoOpLogger};
