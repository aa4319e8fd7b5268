//! Structured logging setup, mirroring how the binaries that embed this
//! crate are expected to initialize `tracing`.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber reading `RUST_LOG` (default `info`).
/// Library code only emits spans/events; it never calls this itself — the
/// embedding CLI/TUI/server calls it once at startup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
