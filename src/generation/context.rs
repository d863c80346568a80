//! Token generation loop
//!
//! A `GenerationContext` owns everything one request needs to advance the
//! model: the scoring capability, the running token sequence, the selector
//! and the stopping policy. Each `step` performs exactly one scoring pass over
//! the full sequence and appends exactly one token.

use std::sync::Arc;

use crate::generation::sampler::{SelectionPolicy, Selector};
use crate::generation::GenerationError;
use crate::inference::LanguageModel;
use crate::types::{GeneratedToken, TokenId};

/// When a generation ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopPolicy {
    /// Upper bound on generated tokens
    pub max_new_tokens: usize,
    /// End after the model's EOS token has been produced
    pub stop_on_eos: bool,
    /// End after a fragment whose trimmed text equals one of these
    pub stop_fragments: Vec<String>,
}

impl StopPolicy {
    /// Stop on budget or EOS
    pub fn budget_or_eos(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            stop_on_eos: true,
            stop_fragments: Vec::new(),
        }
    }

    /// Stop on budget or on a terminating fragment; EOS is not special
    pub fn budget_or_fragments(max_new_tokens: usize, stop_fragments: Vec<String>) -> Self {
        Self {
            max_new_tokens,
            stop_on_eos: false,
            stop_fragments,
        }
    }

    fn is_stop_fragment(&self, text: &str) -> bool {
        let trimmed = text.trim();
        self.stop_fragments.iter().any(|stop| stop == trimmed)
    }
}

/// Why the iterator ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Budget,
    EndOfSequence,
    StopFragment,
    Error,
}

/// Per-request generation state
pub struct GenerationContext {
    model: Arc<dyn LanguageModel>,
    tokens: Vec<TokenId>,
    prompt_len: usize,
    selector: Selector,
    stop: StopPolicy,
    finish: Option<FinishReason>,
}

impl GenerationContext {
    /// Starts a generation from already-tokenized prompt ids
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prompt_tokens: Vec<TokenId>,
        policy: SelectionPolicy,
        stop: StopPolicy,
    ) -> Result<Self, GenerationError> {
        if prompt_tokens.is_empty() {
            return Err(GenerationError::EmptyContext);
        }

        Ok(Self {
            model,
            prompt_len: prompt_tokens.len(),
            tokens: prompt_tokens,
            selector: Selector::new(policy),
            stop,
            finish: None,
        })
    }

    /// Tokenizes `prompt` and starts a generation from it
    pub fn from_prompt(
        model: Arc<dyn LanguageModel>,
        prompt: &str,
        policy: SelectionPolicy,
        stop: StopPolicy,
    ) -> Result<Self, GenerationError> {
        let tokens = model.tokenize(prompt)?;
        tracing::debug!("Tokenized prompt into {} tokens", tokens.len());
        Self::new(model, tokens, policy, stop)
    }

    /// One scoring pass, one selected token, appended to the sequence
    ///
    /// Does not consult the stopping policy; the iterator does that.
    pub fn step(&mut self) -> Result<GeneratedToken, GenerationError> {
        let logits = self.model.score(&self.tokens)?;
        let id = self.selector.select(&logits)?;
        self.tokens.push(id);

        let text = self.model.decode_token(id)?;
        tracing::trace!(step = self.generated_len(), id, ?text, "Generated token");
        Ok(GeneratedToken::new(id, text))
    }

    /// Prompt plus every generated token
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn generated_len(&self) -> usize {
        self.tokens.len() - self.prompt_len
    }

    pub fn prompt_len(&self) -> usize {
        self.prompt_len
    }

    /// Set once the iterator has ended
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    fn finish(&mut self, reason: FinishReason) {
        tracing::debug!(
            ?reason,
            generated = self.generated_len(),
            "Generation finished"
        );
        self.finish = Some(reason);
    }
}

impl Iterator for GenerationContext {
    type Item = Result<GeneratedToken, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finish.is_some() {
            return None;
        }
        if self.generated_len() >= self.stop.max_new_tokens {
            self.finish(FinishReason::Budget);
            return None;
        }

        let token = match self.step() {
            Ok(token) => token,
            Err(e) => {
                self.finish(FinishReason::Error);
                return Some(Err(e));
            }
        };

        if self.stop.stop_on_eos && self.model.eos_token() == Some(token.id) {
            self.finish(FinishReason::EndOfSequence);
        } else if self.stop.is_stop_fragment(&token.text) {
            self.finish(FinishReason::StopFragment);
        }

        Some(Ok(token))
    }
}

impl std::iter::FusedIterator for GenerationContext {}
