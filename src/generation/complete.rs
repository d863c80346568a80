//! Full-response assembler
//!
//! Samples up to a fixed budget of new tokens, then decodes the whole
//! sequence (prompt included) into one string. Nothing partial is ever
//! visible to the caller.

use std::sync::Arc;

use crate::generation::context::{GenerationContext, StopPolicy};
use crate::generation::sampler::{SamplingParams, SelectionPolicy};
use crate::generation::GenerationError;
use crate::inference::LanguageModel;
use crate::types::error_marker;

/// Default new-token budget for full completions
pub const DEFAULT_MAX_NEW_TOKENS: usize = 100;

/// Drives sampled generations to completion
#[derive(Clone)]
pub struct Completer {
    model: Arc<dyn LanguageModel>,
    params: SamplingParams,
    max_new_tokens: usize,
}

impl Completer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            params: SamplingParams::default(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Completes `prompt`, turning any failure into an error marker
    pub fn complete(&self, prompt: &str) -> String {
        match self.try_complete(prompt) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Full completion failed: {}", e);
                error_marker(e)
            }
        }
    }

    /// Completes `prompt`, propagating failures
    pub fn try_complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut ctx = GenerationContext::from_prompt(
            self.model.clone(),
            prompt,
            SelectionPolicy::Sampling(self.params.clone()),
            StopPolicy::budget_or_eos(self.max_new_tokens),
        )?;

        for token in ctx.by_ref() {
            token?;
        }

        tracing::debug!(
            prompt_tokens = ctx.prompt_len(),
            generated = ctx.generated_len(),
            "Assembled full response"
        );
        Ok(self.model.decode(ctx.tokens(), true)?)
    }
}
