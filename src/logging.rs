//! Logging initialization for binaries and tests embedding the crate
//!
//! The library itself only emits `tracing` events; wiring a subscriber is
//! the host's job. This helper installs a sensible fmt subscriber once,
//! honoring `RUST_LOG` when set.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a global fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `info` for this crate. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sqlsage=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
