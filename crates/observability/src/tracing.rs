//! Tracing subscriber configuration for the storefront binaries.

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber: JSON lines with timestamps, filtered
/// by `RUST_LOG` (`info` when unset).
///
/// Safe to call multiple times (subsequent calls are no-ops), so black-box
/// test servers and the real binary share the same entry point.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
