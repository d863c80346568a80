//! Shared handler state

use std::sync::Arc;

use crate::generation::{Completer, FragmentStream, SamplingParams, StreamOptions};
use crate::inference::LanguageModel;
use crate::storage::{InteractionLogger, ServerSettings};

/// Application state shared across handlers
///
/// Holds only immutable handles. Each request builds its own generation
/// state from them.
#[derive(Clone)]
pub struct AppState {
    /// Model for scoring and tokenization
    model: Arc<dyn LanguageModel>,
    /// Full-completion driver
    completer: Completer,
    /// Limits for streamed generations
    stream_options: StreamOptions,
    /// Shared interaction log
    logger: InteractionLogger,
}

impl AppState {
    /// State with default generation parameters
    pub fn new(model: Arc<dyn LanguageModel>, logger: InteractionLogger) -> Self {
        Self {
            completer: Completer::new(model.clone()),
            model,
            stream_options: StreamOptions::default(),
            logger,
        }
    }

    /// State configured from server settings
    pub fn from_settings(model: Arc<dyn LanguageModel>, settings: &ServerSettings) -> Self {
        let completer = Completer::new(model.clone())
            .with_params(SamplingParams {
                top_k: settings.full.top_k,
                top_p: settings.full.top_p,
                temperature: settings.full.temperature,
                seed: settings.full.seed,
            })
            .with_max_new_tokens(settings.full.max_new_tokens);

        Self {
            completer,
            model,
            stream_options: StreamOptions {
                max_new_tokens: settings.stream.max_new_tokens,
                stop_fragments: settings.stream.stop_fragments.clone(),
            },
            logger: InteractionLogger::new(settings.log_path.clone()),
        }
    }

    pub fn completer(&self) -> &Completer {
        &self.completer
    }

    pub fn logger(&self) -> &InteractionLogger {
        &self.logger
    }

    /// Fresh fragment stream for one request
    pub fn fragment_stream(&self, prompt: &str) -> FragmentStream {
        FragmentStream::new(self.model.clone(), prompt, self.stream_options.clone())
    }
}
