//! Scripted in-memory model for tests
//!
//! A tiny fixed vocabulary, a longest-match tokenizer and a scoring function
//! that puts all the mass on whatever token the script picks next.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::inference::backend::LanguageModel;
use crate::inference::engine::EngineError;
use crate::types::TokenId;

pub(crate) const VOCAB: &[&str] = &[
    "<eos>", "Hello", " world", ".", "!", "?", " again", " and", ",", " ", "Hi",
];

pub(crate) const EOS: TokenId = 0;

type Scorer = dyn Fn(&[TokenId], usize) -> Result<Vec<f32>, EngineError> + Send + Sync;

pub(crate) struct ScriptedModel {
    scorer: Box<Scorer>,
    score_calls: AtomicUsize,
    context_lengths: std::sync::Mutex<Vec<usize>>,
}

impl ScriptedModel {
    /// Puts all the mass on whatever token `script` returns
    pub(crate) fn new(
        script: impl Fn(&[TokenId], usize) -> Result<TokenId, EngineError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_scores(move |context, call| {
            let next = script(context, call)?;
            let mut logits = vec![0.0; VOCAB.len()];
            logits[next as usize] = 30.0;
            Ok(logits)
        })
    }

    pub(crate) fn with_scores(
        scorer: impl Fn(&[TokenId], usize) -> Result<Vec<f32>, EngineError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            scorer: Box::new(scorer),
            score_calls: AtomicUsize::new(0),
            context_lengths: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// `favourite` narrowly ahead of every other token; EOS far behind
    ///
    /// Greedy always picks `favourite`; sampling regularly does not.
    pub(crate) fn near_tie(favourite: &str) -> Arc<Self> {
        let favourite = token_id(favourite) as usize;
        Self::with_scores(move |_, _| {
            let mut logits = vec![0.9; VOCAB.len()];
            logits[EOS as usize] = -30.0;
            logits[favourite] = 1.0;
            Ok(logits)
        })
    }

    /// Always argmaxes to `piece`
    pub(crate) fn always(piece: &str) -> Arc<Self> {
        let id = token_id(piece);
        Self::new(move |_, _| Ok(id))
    }

    /// Plays `pieces` in order, then repeats the last one
    pub(crate) fn sequence(pieces: &[&str]) -> Arc<Self> {
        let ids: Vec<TokenId> = pieces.iter().map(|piece| token_id(piece)).collect();
        Self::new(move |_, call| Ok(ids[call.min(ids.len() - 1)]))
    }

    /// Fails on the first scoring call
    pub(crate) fn failing(message: &str) -> Arc<Self> {
        let message = message.to_string();
        Self::new(move |_, _| Err(EngineError::Inference(message.clone())))
    }

    pub(crate) fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    /// Length of the context passed to each scoring call, in call order
    pub(crate) fn context_lengths(&self) -> Vec<usize> {
        self.context_lengths.lock().unwrap().clone()
    }
}

pub(crate) fn token_id(piece: &str) -> TokenId {
    VOCAB
        .iter()
        .position(|entry| *entry == piece)
        .unwrap_or_else(|| panic!("{piece:?} is not in the test vocabulary")) as TokenId
}

impl LanguageModel for ScriptedModel {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EngineError> {
        let mut tokens = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let (id, len) = VOCAB
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, entry)| rest.starts_with(**entry))
                .map(|(id, entry)| (id as TokenId, entry.len()))
                .max_by_key(|(_, len)| *len)
                .ok_or_else(|| EngineError::Tokenization(format!("unknown text {rest:?}")))?;
            tokens.push(id);
            rest = &rest[len..];
        }
        Ok(tokens)
    }

    fn score(&self, context: &[TokenId]) -> Result<Vec<f32>, EngineError> {
        let call = self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.context_lengths.lock().unwrap().push(context.len());
        (self.scorer)(context, call)
    }

    fn decode(&self, tokens: &[TokenId], skip_special: bool) -> Result<String, EngineError> {
        let mut text = String::new();
        for &token in tokens {
            if skip_special && token == EOS {
                continue;
            }
            let piece = VOCAB
                .get(token as usize)
                .ok_or_else(|| EngineError::Inference(format!("unknown token {token}")))?;
            text.push_str(piece);
        }
        Ok(text)
    }

    fn eos_token(&self) -> Option<TokenId> {
        Some(EOS)
    }
}
