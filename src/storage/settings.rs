//! Settings storage
//!
//! Loads the server settings from a JSON file. Every field has a default, so a
//! partial file (or none at all) is valid.

use crate::storage::StorageError;
use crate::types::config::DEFAULT_LOG_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// GGUF model to load at startup
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Number of GPU layers to offload (0 = CPU only)
    #[serde(default)]
    pub gpu_layers: u32,
    /// Context window size, capped to the model's training context at load
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    /// Interaction log file
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// `/generate` parameters
    #[serde(default)]
    pub full: FullModeSettings,
    /// `/generate-stream` parameters
    #[serde(default)]
    pub stream: StreamModeSettings,
}

/// Sampling parameters for full completions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FullModeSettings {
    /// Maximum number of new tokens
    pub max_new_tokens: usize,
    /// Top-k restriction (0 = disabled)
    pub top_k: usize,
    /// Nucleus threshold
    pub top_p: f32,
    /// Temperature applied to scores before thresholding
    pub temperature: f32,
    /// Fixed seed; random per request when unset
    pub seed: Option<u64>,
}

impl Default for FullModeSettings {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            top_k: 50,
            top_p: 0.85,
            temperature: 0.6,
            seed: None,
        }
    }
}

/// Limits for streamed generations (selection is always greedy)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamModeSettings {
    /// Maximum number of fragments
    pub max_new_tokens: usize,
    /// Fragments that end the stream once emitted (compared trimmed)
    pub stop_fragments: Vec<String>,
}

impl Default for StreamModeSettings {
    fn default() -> Self {
        Self {
            max_new_tokens: 60,
            stop_fragments: vec![".".to_string(), "!".to_string(), "?".to_string()],
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_context_size() -> u32 {
    2048
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_path: None,
            gpu_layers: 0,
            context_size: default_context_size(),
            log_path: default_log_path(),
            full: FullModeSettings::default(),
            stream: StreamModeSettings::default(),
        }
    }
}

impl ServerSettings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.context_size = self.context_size.clamp(256, 131072);

        self.full.temperature = self.full.temperature.clamp(0.0, 2.0);
        self.full.top_p = self.full.top_p.clamp(0.0, 1.0);
        self.full.max_new_tokens = self.full.max_new_tokens.clamp(1, 4096);

        self.stream.max_new_tokens = self.stream.max_new_tokens.clamp(1, 4096);
        self.stream
            .stop_fragments
            .retain(|fragment| !fragment.trim().is_empty());

        if self.host.trim().is_empty() {
            self.host = default_host();
        }
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load settings from `path`, or defaults when no path is given
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings(path: Option<&Path>) -> ServerSettings {
    let Some(path) = path else {
        return ServerSettings::default();
    };

    match load_settings_internal(path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings from {:?}, using defaults: {}", path, e);
            ServerSettings::default()
        }
    }
}

/// Internal settings loading with error propagation
fn load_settings_internal(path: &Path) -> Result<ServerSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file {:?} not found, using defaults", path);
        return Ok(ServerSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: ServerSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ServerSettings::default();
        assert_eq!(settings.bind_address(), "127.0.0.1:8000");
        assert_eq!(settings.full.max_new_tokens, 100);
        assert_eq!(settings.full.top_k, 50);
        assert_eq!(settings.full.top_p, 0.85);
        assert_eq!(settings.full.temperature, 0.6);
        assert_eq!(settings.stream.max_new_tokens, 60);
        assert_eq!(settings.stream.stop_fragments, vec![".", "!", "?"]);
        assert_eq!(settings.log_path, PathBuf::from("logs/log.jsonl"));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = ServerSettings::default();

        settings.full.temperature = 5.0;
        settings.full.top_p = 2.0;
        settings.full.top_k = 0;
        settings.context_size = 10;
        settings.stream.stop_fragments = vec![" ".to_string(), "?".to_string()];
        settings.validate();

        assert_eq!(settings.full.temperature, 2.0);
        assert_eq!(settings.full.top_p, 1.0);
        // 0 disables the restriction and survives validation
        assert_eq!(settings.full.top_k, 0);
        assert_eq!(settings.context_size, 256);
        assert_eq!(settings.stream.stop_fragments, vec!["?"]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "port": 9001, "full": { "temperature": 0.2 } }"#;
        let settings: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.port, 9001);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.full.temperature, 0.2);
        assert_eq!(settings.full.top_k, 50);
        assert_eq!(settings.stream.max_new_tokens, 60);
    }

    #[test]
    fn test_load_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_settings(Some(&dir.path().join("nope.json")));
        assert_eq!(missing.port, 8000);

        let corrupt_path = dir.path().join("settings.json");
        fs::write(&corrupt_path, "{ not json").unwrap();
        let corrupt = load_settings(Some(&corrupt_path));
        assert_eq!(corrupt.port, 8000);

        fs::write(&corrupt_path, r#"{ "port": 8123 }"#).unwrap();
        assert_eq!(load_settings(Some(&corrupt_path)).port, 8123);
    }
}
