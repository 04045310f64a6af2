//! Telemetry logic.
//! Structured logging with `tracing`.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Verbosity comes from `RUST_LOG`; `info` otherwise.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}
