//! Tracing setup shared by both binaries
//!
//! `RUST_LOG` wins when set; otherwise each binary passes its own default.

use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber
///
/// Calling it twice is harmless: the second install is ignored.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
