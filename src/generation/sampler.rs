//! Next-token selection
//!
//! Two policies pick a token from one vector of scores:
//!
//! - **Greedy**: argmax, deterministic
//! - **Sampling**: temperature, then top-k, then softmax, then top-p, then a
//!   weighted draw from what is left
//!
//! The driver chooses the policy; the generation context just calls `select`.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::generation::GenerationError;
use crate::types::TokenId;

/// Parameters of the sampling policy
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Keep the k highest-scoring tokens (0 = disabled)
    pub top_k: usize,
    /// Nucleus threshold (1.0 = disabled)
    pub top_p: f32,
    /// Divides scores before any filtering (0.0 = greedy)
    pub temperature: f32,
    /// Fixed seed for reproducible draws
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_k: 50,
            top_p: 0.85,
            temperature: 0.6,
            seed: None,
        }
    }
}

/// Which policy a driver wants
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionPolicy {
    Greedy,
    Sampling(SamplingParams),
}

/// Stateful selector built from a `SelectionPolicy`
///
/// Holds the RNG for sampling, so one selector belongs to one request.
#[derive(Debug)]
pub enum Selector {
    Greedy,
    Sampling { params: SamplingParams, rng: StdRng },
}

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        match policy {
            SelectionPolicy::Greedy => Selector::Greedy,
            SelectionPolicy::Sampling(params) => {
                let rng = match params.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                Selector::Sampling { params, rng }
            }
        }
    }

    /// Picks one token id from `logits`
    pub fn select(&mut self, logits: &[f32]) -> Result<TokenId, GenerationError> {
        match self {
            Selector::Greedy => argmax(logits),
            Selector::Sampling { params, rng } => sample(logits, params, rng),
        }
    }
}

/// Index of the highest score; the lowest index wins ties and NaN never wins
pub fn argmax(logits: &[f32]) -> Result<TokenId, GenerationError> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in logits.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }

    best.map(|(i, _)| i as TokenId)
        .ok_or_else(|| GenerationError::Sampling("no finite scores to select from".to_string()))
}

fn sample(
    logits: &[f32],
    params: &SamplingParams,
    rng: &mut StdRng,
) -> Result<TokenId, GenerationError> {
    if params.temperature <= 0.0 {
        return argmax(logits);
    }

    // Temperature first, on raw scores
    let mut candidates: Vec<(usize, f32)> = logits
        .iter()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .map(|(i, &score)| (i, score / params.temperature))
        .collect();
    if candidates.is_empty() {
        return Err(GenerationError::Sampling(
            "no finite scores to sample from".to_string(),
        ));
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    if params.top_k > 0 {
        candidates.truncate(params.top_k);
    }

    let probs = softmax(&candidates);
    let keep = nucleus_len(&probs, params.top_p);
    let weights = &probs[..keep];

    let dist = WeightedIndex::new(weights)
        .map_err(|e| GenerationError::Sampling(format!("Failed to create distribution: {e}")))?;
    let picked = dist.sample(rng);

    tracing::trace!(
        candidates = keep,
        picked = candidates[picked].0,
        "Sampled next token"
    );
    Ok(candidates[picked].0 as TokenId)
}

/// Softmax over already-sorted candidates (first is the maximum)
fn softmax(candidates: &[(usize, f32)]) -> Vec<f64> {
    let max = candidates[0].1 as f64;
    let exps: Vec<f64> = candidates
        .iter()
        .map(|(_, score)| (*score as f64 - max).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Length of the smallest descending prefix whose mass reaches `top_p`
///
/// Always at least one.
fn nucleus_len(probs: &[f64], top_p: f32) -> usize {
    if top_p >= 1.0 {
        return probs.len();
    }

    let threshold = top_p as f64;
    let mut cumulative = 0.0;
    for (i, p) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= threshold {
            return i + 1;
        }
    }
    probs.len()
}
