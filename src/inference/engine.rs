//! Inference engine implementation
//!
//! `LanguageModel` backed by llama-cpp.
//!
//! # Architecture
//!
//! Since llama-cpp-2 types (`LlamaBackend`, `LlamaModel`, `LlamaContext`) contain
//! raw pointers that are not `Send`, all inference operations run on a dedicated
//! worker thread. Callers communicate with it via channels, which also
//! serializes model access across concurrent requests.
//!
//! Every `score` call clears the KV cache and decodes the whole context again,
//! so no state carries over between calls or between requests.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;
use thiserror::Error;

use crate::inference::backend::LanguageModel;
use crate::inference::model::{validate_gguf, ModelError};
use crate::types::TokenId;

/// Errors that can occur during inference operations
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("Backend not initialized")]
    BackendNotInitialized,

    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to create context: {0}")]
    ContextCreate(String),

    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Context of {len} tokens exceeds window of {capacity}")]
    ContextOverflow { len: usize, capacity: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Worker thread error: {0}")]
    WorkerError(String),
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::ModelValidation(e.to_string())
    }
}

/// How to load the model
#[derive(Debug, Clone)]
pub struct LoadParams {
    /// Number of layers to offload to GPU (0 = CPU only)
    pub gpu_layers: u32,
    /// Requested context window; capped to the model's training context
    pub context_size: u32,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            gpu_layers: 0,
            context_size: 2048,
        }
    }
}

/// Model information after loading
#[derive(Debug, Clone)]
pub struct LoadedModelInfo {
    /// Path to the loaded model
    pub path: String,
    /// Vocabulary size
    pub vocab_size: i32,
    /// Embedding dimension
    pub embedding_dim: i32,
    /// Training context length
    pub context_length: u32,
    /// Context window actually allocated
    pub context_size: u32,
    /// Total parameter count
    pub param_count: u64,
    /// Model size in bytes
    pub size_bytes: u64,
    /// End-of-sequence token
    pub eos_token: TokenId,
}

type Reply<T> = Sender<Result<T, EngineError>>;

/// Commands sent to the worker thread
enum WorkerCommand {
    Tokenize {
        text: String,
        reply: Reply<Vec<TokenId>>,
    },
    Score {
        context: Vec<TokenId>,
        reply: Reply<Vec<f32>>,
    },
    Decode {
        tokens: Vec<TokenId>,
        skip_special: bool,
        reply: Reply<String>,
    },
    Shutdown,
}

/// llama-cpp model running on its own worker thread
pub struct LlamaEngine {
    /// Channel to send commands to the worker thread
    command_tx: Option<Sender<WorkerCommand>>,
    /// Handle to the worker thread
    worker_handle: Option<JoinHandle<()>>,
    /// Info captured once the model was loaded
    model_info: LoadedModelInfo,
}

impl LlamaEngine {
    /// Loads a GGUF model and starts the worker thread
    ///
    /// Blocks until the model and its context are ready.
    pub fn load<P: AsRef<Path>>(path: P, params: LoadParams) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();

        // Validate GGUF file first (on the calling thread, just file I/O)
        let metadata = validate_gguf(&path)?;
        tracing::debug!(
            "GGUF v{} validation passed for {:?} ({} tensors)",
            metadata.version,
            path,
            metadata.tensor_count
        );

        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("llama-worker".to_string())
            .spawn(move || worker_thread_main(path, params, ready_tx, command_rx))
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        let model_info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(e) => {
                let _ = handle.join();
                return Err(EngineError::WorkerError(e.to_string()));
            }
        };

        tracing::info!(
            "Model loaded: {} ({} params, {} MB, {} vocab, {} embd, {}/{} ctx)",
            model_info.path,
            model_info.param_count,
            model_info.size_bytes / (1024 * 1024),
            model_info.vocab_size,
            model_info.embedding_dim,
            model_info.context_size,
            model_info.context_length
        );

        Ok(Self {
            command_tx: Some(command_tx),
            worker_handle: Some(handle),
            model_info,
        })
    }

    /// Returns information about the loaded model
    pub fn model_info(&self) -> &LoadedModelInfo {
        &self.model_info
    }

    fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> WorkerCommand,
    ) -> Result<T, EngineError> {
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or(EngineError::BackendNotInitialized)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        command_tx
            .send(command(reply_tx))
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        reply_rx
            .recv()
            .map_err(|e| EngineError::WorkerError(e.to_string()))?
    }
}

impl LanguageModel for LlamaEngine {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EngineError> {
        self.request(|reply| WorkerCommand::Tokenize {
            text: text.to_string(),
            reply,
        })
    }

    fn score(&self, context: &[TokenId]) -> Result<Vec<f32>, EngineError> {
        self.request(|reply| WorkerCommand::Score {
            context: context.to_vec(),
            reply,
        })
    }

    fn decode(&self, tokens: &[TokenId], skip_special: bool) -> Result<String, EngineError> {
        self.request(|reply| WorkerCommand::Decode {
            tokens: tokens.to_vec(),
            skip_special,
            reply,
        })
    }

    fn eos_token(&self) -> Option<TokenId> {
        Some(self.model_info.eos_token)
    }
}

impl Drop for LlamaEngine {
    fn drop(&mut self) {
        // Send shutdown command
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        // Wait for worker thread to finish
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Worker thread main loop
///
/// Owns the LlamaBackend, LlamaModel and LlamaContext, processes commands
/// until shutdown or until every sender is gone.
fn worker_thread_main(
    path: PathBuf,
    params: LoadParams,
    ready_tx: Sender<Result<LoadedModelInfo, EngineError>>,
    command_rx: Receiver<WorkerCommand>,
) {
    let backend = match LlamaBackend::init() {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Failed to init backend: {}", e);
            let _ = ready_tx.send(Err(EngineError::BackendInit(e.to_string())));
            return;
        }
    };

    let model_params = LlamaModelParams::default().with_n_gpu_layers(params.gpu_layers);
    let model = match LlamaModel::load_from_file(&backend, &path, &model_params) {
        Ok(model) => model,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::ModelLoad(e.to_string())));
            return;
        }
    };

    let n_ctx = params.context_size.min(model.n_ctx_train()).max(1);
    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(NonZeroU32::new(n_ctx))
        .with_n_batch(n_ctx);

    let mut ctx = match model.new_context(&backend, ctx_params) {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::ContextCreate(e.to_string())));
            return;
        }
    };

    let info = LoadedModelInfo {
        path: path.to_string_lossy().to_string(),
        vocab_size: model.n_vocab(),
        embedding_dim: model.n_embd(),
        context_length: model.n_ctx_train(),
        context_size: ctx.n_ctx(),
        param_count: model.n_params() as u64,
        size_bytes: model.size() as u64,
        eos_token: model.token_eos().0,
    };
    if ready_tx.send(Ok(info)).is_err() {
        return;
    }

    loop {
        match command_rx.recv() {
            Ok(WorkerCommand::Tokenize { text, reply }) => {
                let _ = reply.send(tokenize(&model, &text));
            }
            Ok(WorkerCommand::Score { context, reply }) => {
                let _ = reply.send(score_context(&mut ctx, &context));
            }
            Ok(WorkerCommand::Decode {
                tokens,
                skip_special,
                reply,
            }) => {
                let _ = reply.send(decode(&model, &tokens, skip_special));
            }
            Ok(WorkerCommand::Shutdown) => {
                tracing::info!("Worker thread shutting down");
                break;
            }
            Err(_) => {
                // Channel closed, exit
                tracing::debug!("Command channel closed, worker exiting");
                break;
            }
        }
    }
}

fn tokenize(model: &LlamaModel, text: &str) -> Result<Vec<TokenId>, EngineError> {
    let tokens = model
        .str_to_token(text, AddBos::Always)
        .map_err(|e| EngineError::Tokenization(e.to_string()))?;
    tracing::trace!("Tokenized {} bytes into {} tokens", text.len(), tokens.len());
    Ok(tokens.into_iter().map(|token| token.0).collect())
}

/// Decodes the whole context from scratch and returns the last position's logits
fn score_context(ctx: &mut LlamaContext, tokens: &[TokenId]) -> Result<Vec<f32>, EngineError> {
    let Some(last) = tokens.len().checked_sub(1) else {
        return Err(EngineError::Inference("Cannot score an empty context".to_string()));
    };

    let capacity = ctx.n_ctx() as usize;
    if tokens.len() > capacity {
        return Err(EngineError::ContextOverflow {
            len: tokens.len(),
            capacity,
        });
    }

    ctx.clear_kv_cache();

    let mut batch = LlamaBatch::new(tokens.len(), 1);
    for (i, &token) in tokens.iter().enumerate() {
        batch
            .add(LlamaToken::new(token), i as i32, &[0], i == last)
            .map_err(|e| EngineError::Inference(format!("Failed to add token to batch: {}", e)))?;
    }

    ctx.decode(&mut batch)
        .map_err(|e| EngineError::Inference(format!("Failed to decode: {}", e)))?;

    Ok(ctx.get_logits_ith(last as i32).to_vec())
}

fn decode(model: &LlamaModel, tokens: &[TokenId], skip_special: bool) -> Result<String, EngineError> {
    let special = if skip_special {
        Special::Plaintext
    } else {
        Special::Tokenize
    };

    // Concatenate bytes first so multi-token UTF-8 sequences decode intact
    let mut bytes = Vec::new();
    for &token in tokens {
        let piece = model
            .token_to_bytes(LlamaToken::new(token), special)
            .map_err(|e| EngineError::Inference(format!("Failed to convert token to bytes: {}", e)))?;
        bytes.extend_from_slice(&piece);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_params_default() {
        let params = LoadParams::default();
        assert_eq!(params.gpu_layers, 0);
        assert_eq!(params.context_size, 2048);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not gguf").unwrap();

        let result = LlamaEngine::load(file.path(), LoadParams::default());
        assert!(matches!(result, Err(EngineError::ModelValidation(_))));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::ContextOverflow {
            len: 2100,
            capacity: 2048,
        };
        assert_eq!(
            err.to_string(),
            "Context of 2100 tokens exceeds window of 2048"
        );
    }
}
