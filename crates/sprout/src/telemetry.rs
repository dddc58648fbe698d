//! Log output setup for the binary.

use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set and valid; otherwise `level` (from the config
/// file) is used, and `info` if that doesn't parse either. Calling this twice
/// is harmless.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
