//! Unified error type for the Sprout client.

use std::path::PathBuf;

use sprout_farm::FarmError;
use sprout_session::{AccountError, SignError, StoreError};
use sprout_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Everything here is raised while loading configuration and input files or
/// building clients, before or outside the farming loop. Failures inside the
/// loop are retried by the orchestrator and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum SproutError {
    /// A config value, account key or proxy entry is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// An input file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Farm(#[from] FarmError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
