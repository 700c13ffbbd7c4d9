//! Process-wide structured logging, initialized once per binary entrypoint.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize `tracing` with an env-filter seeded from `LOG_LEVEL` when
/// `RUST_LOG` is not set. This is the one process-global singleton the
/// design allows — everything else flows through `Arc<Settings>`.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(true).init();
}
