//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries and tests decide where
//! they go. `init` is safe to call repeatedly, later calls are ignored.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber.
///
/// `filter` uses `EnvFilter` syntax (e.g. `"storage_env=debug"`). With
/// `None`, `RUST_LOG` is consulted and falls back to `info`.
pub fn init(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Subscriber for tests: output goes through the test harness capture.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("storage_env=debug"))
        .with_test_writer()
        .try_init();
}
