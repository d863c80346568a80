//! Generation core
//!
//! The token loop, the two selection policies, and the two drivers built on
//! them: the full-response assembler (sampling) and the streaming adapter
//! (greedy).

pub mod complete;
pub mod context;
pub mod sampler;
pub mod streaming;

use thiserror::Error;

use crate::inference::EngineError;

pub use complete::Completer;
pub use context::{FinishReason, GenerationContext, StopPolicy};
pub use sampler::{SamplingParams, SelectionPolicy, Selector};
pub use streaming::{FragmentStream, StreamOptions};

/// Errors raised while driving a generation
#[derive(Debug, Error, Clone)]
pub enum GenerationError {
    #[error("Prompt produced no tokens")]
    EmptyContext,

    #[error("Sampling failed: {0}")]
    Sampling(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Generation task failed: {0}")]
    Worker(String),
}
