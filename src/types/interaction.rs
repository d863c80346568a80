//! Interaction types
//!
//! Defines the request mode and the log entry written for every request.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which generation path served a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Sampled completion returned as one string
    Full,
    /// Greedy fragments delivered as they are produced
    Stream,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => f.write_str("full"),
            Mode::Stream => f.write_str("stream"),
        }
    }
}

/// A single line of the interaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEntry {
    /// UTC time the entry was created, ISO-8601
    pub timestamp: String,
    /// Generation path
    pub mode: Mode,
    /// The prompt as received
    pub prompt: String,
    /// Full response text, or an error marker
    pub response: String,
}

impl InteractionEntry {
    /// Create an entry stamped with the current UTC time
    pub fn now(prompt: impl Into<String>, response: impl Into<String>, mode: Mode) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            mode,
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

/// Format an error the way failed requests are reported and logged
pub fn error_marker(error: impl fmt::Display) -> String {
    format!("[ERROR: {}]", error)
}
