//! Sampled-completion logging to a jsonl file.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// One logged completion with its scalar reward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub step: u64,
    pub prompt: String,
    pub completion: String,
    pub reward: f64,
}

/// Appends one json record per completion to a file.
///
/// Intended to be held by rank 0 only; other ranks keep `None` and skip
/// logging entirely.
pub struct CompletionLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CompletionLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, records: &[CompletionRecord]) -> Result<()> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
