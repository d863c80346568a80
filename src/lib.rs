//! LocaLM Serve
//!
//! A local language model behind two HTTP routes, one returning the whole
//! completion and one streaming it fragment by fragment, plus the CLI client
//! that talks to them. Both sides append every interaction to a JSON Lines log.

pub mod client;
pub mod generation;
pub mod inference;
pub mod logging;
pub mod server;
pub mod storage;
pub mod types;
