//! Logging setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call `init_tracing` once; `RUST_LOG` controls the filter
//! (default: info).

use crate::error::{Result, StoreError};
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber. Fails if one is already installed.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(|err| StoreError::Config(format!("tracing already initialized: {}", err)))
}

/// Like `init_tracing`, but writes through the test harness and ignores an
/// existing subscriber
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_reported() {
        init_test_tracing();
        assert!(matches!(init_tracing(), Err(StoreError::Config(_))));
    }
}
