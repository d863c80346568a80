//! Shared type definitions
//!
//! This module contains the data types passed between the generation core,
//! the HTTP layer and the interaction log.

pub mod config;
pub mod interaction;
pub mod token;

pub use config::ClientConfig;
pub use interaction::{error_marker, InteractionEntry, Mode};
pub use token::{GeneratedToken, TokenId};
