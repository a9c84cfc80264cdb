//! Tracing subscriber setup for binaries.
//!
//! `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"warn"` or
//! `"paranoia_kernel=debug"`) applies. Log lines go to stderr so stdout stays
//! free for headlines.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
