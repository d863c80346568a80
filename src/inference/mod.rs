//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and
//! scoring, behind the `LanguageModel` capability trait.

pub mod backend;
pub mod engine;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use backend::LanguageModel;
pub use engine::{EngineError, LlamaEngine, LoadParams, LoadedModelInfo};
pub use model::{validate_gguf, GgufMetadata, ModelError, GGUF_MAGIC};
