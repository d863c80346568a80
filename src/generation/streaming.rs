//! Streaming delivery adapter
//!
//! Greedy generation exposed as a pull-driven sequence of text fragments.
//! The next token is computed only when the consumer asks for it, and every
//! emitted fragment is kept so the whole transcript can be logged once the
//! sequence ends.

use std::sync::Arc;

use crate::generation::context::{GenerationContext, StopPolicy};
use crate::generation::sampler::SelectionPolicy;
use crate::generation::GenerationError;
use crate::inference::LanguageModel;

/// Limits for a streamed generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub max_new_tokens: usize,
    pub stop_fragments: Vec<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 60,
            stop_fragments: vec![".".to_string(), "!".to_string(), "?".to_string()],
        }
    }
}

enum State {
    /// Not tokenized yet; happens on the first pull
    Pending(String),
    Running(GenerationContext),
    Done,
}

/// Lazy, finite, non-restartable fragment sequence
pub struct FragmentStream {
    model: Arc<dyn LanguageModel>,
    options: StreamOptions,
    state: State,
    transcript: String,
    emitted: usize,
}

impl FragmentStream {
    pub fn new(model: Arc<dyn LanguageModel>, prompt: impl Into<String>, options: StreamOptions) -> Self {
        Self {
            model,
            options,
            state: State::Pending(prompt.into()),
            transcript: String::new(),
            emitted: 0,
        }
    }

    /// Every fragment emitted so far, joined
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Number of fragments emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn start(&self, prompt: &str) -> Result<GenerationContext, GenerationError> {
        GenerationContext::from_prompt(
            self.model.clone(),
            prompt,
            SelectionPolicy::Greedy,
            StopPolicy::budget_or_fragments(
                self.options.max_new_tokens,
                self.options.stop_fragments.clone(),
            ),
        )
    }
}

impl Iterator for FragmentStream {
    type Item = Result<String, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let State::Pending(prompt) = &self.state {
            match self.start(prompt) {
                Ok(ctx) => self.state = State::Running(ctx),
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            }
        }

        let State::Running(ctx) = &mut self.state else {
            return None;
        };

        match ctx.next() {
            Some(Ok(token)) => {
                self.transcript.push_str(&token.text);
                self.emitted += 1;
                Some(Ok(token.text))
            }
            Some(Err(e)) => {
                self.state = State::Done;
                Some(Err(e))
            }
            None => {
                self.state = State::Done;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for FragmentStream {}
