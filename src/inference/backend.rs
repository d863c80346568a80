//! Model capability trait
//!
//! The generation loop only needs two things from a model: next-token scores
//! for a context, and conversion between text and token ids. Everything that
//! drives generation works against this trait.

use crate::inference::engine::EngineError;
use crate::types::TokenId;

/// Scoring and tokenizer capability of a causal language model
///
/// Implementations must be safe to share across requests. Per-request state
/// (the running token sequence) is never stored here.
pub trait LanguageModel: Send + Sync {
    /// Converts text into token ids
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EngineError>;

    /// Returns next-token scores (pre-softmax logits) for the full `context`
    ///
    /// The returned vector is indexed by token id.
    fn score(&self, context: &[TokenId]) -> Result<Vec<f32>, EngineError>;

    /// Converts token ids back into text
    ///
    /// With `skip_special`, control tokens (BOS, EOS, ...) render as nothing.
    fn decode(&self, tokens: &[TokenId], skip_special: bool) -> Result<String, EngineError>;

    /// The model's end-of-sequence token, if it has one
    fn eos_token(&self) -> Option<TokenId>;

    /// Decodes a single token, special tokens included
    fn decode_token(&self, token: TokenId) -> Result<String, EngineError> {
        self.decode(&[token], false)
    }
}
