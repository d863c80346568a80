//! Token types
//!
//! Token ids and the per-step output of the generation loop.

use serde::{Deserialize, Serialize};

/// Integer id of a vocabulary entry (llama.cpp's token representation)
pub type TokenId = i32;

/// One token produced by a single scoring pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedToken {
    /// The selected token id
    pub id: TokenId,
    /// Decoded text of this token alone
    pub text: String,
}

impl GeneratedToken {
    /// Create a new generated token
    pub fn new(id: TokenId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}
