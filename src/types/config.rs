//! Configuration types
//!
//! Client-side configuration. Server settings live in `storage::settings`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default server address used by the CLI client
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Default location of the interaction log, relative to the working directory
pub const DEFAULT_LOG_PATH: &str = "logs/log.jsonl";

/// CLI client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the server, without trailing slash
    pub server_url: String,
    /// Path of the client's own interaction log
    pub log_path: PathBuf,
}

impl ClientConfig {
    /// URL of the full-completion endpoint
    pub fn full_url(&self) -> String {
        format!("{}/generate", self.server_url.trim_end_matches('/'))
    }

    /// URL of the streaming endpoint
    pub fn stream_url(&self) -> String {
        format!("{}/generate-stream", self.server_url.trim_end_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}
