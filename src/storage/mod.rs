//! Persistent storage
//!
//! This module handles all data persistence: the append-only interaction log
//! and the server settings file.

pub mod interactions;
pub mod settings;

use thiserror::Error;

pub use interactions::InteractionLogger;
pub use settings::{load_settings, FullModeSettings, ServerSettings, StreamModeSettings};

/// Errors that can occur while reading or writing persisted state
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
