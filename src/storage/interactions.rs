//! Interaction log
//!
//! Append-only JSON Lines file recording every prompt and its response.
//! Each entry is serialized to one line and written with a single append, so
//! concurrent writers may interleave lines but never split one.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::storage::StorageError;
use crate::types::{InteractionEntry, Mode};

/// Writer for the shared `log.jsonl` file
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    path: PathBuf,
}

impl InteractionLogger {
    /// Creates a logger appending to `path`
    ///
    /// Nothing touches the filesystem until the first `record`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry for a finished (or failed) request
    pub fn record(&self, prompt: &str, response: &str, mode: Mode) -> Result<(), StorageError> {
        self.append(&InteractionEntry::now(prompt, response, mode))
    }

    /// Appends a pre-built entry
    pub fn append(&self, entry: &InteractionEntry) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        tracing::debug!(
            mode = %entry.mode,
            bytes = line.len(),
            "Recorded interaction in {:?}",
            self.path
        );
        Ok(())
    }

    /// Reads every entry back, skipping blank lines
    ///
    /// Returns an empty list when the file does not exist yet.
    pub fn read_entries(&self) -> Result<Vec<InteractionEntry>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StorageError::from))
            .collect()
    }
}
