//! Error types for the farm layer.

use sprout_policy::PolicyError;

/// Conditions that halt one identity's farming.
///
/// Everything recoverable is handled inside the orchestrator loop and never
/// surfaces as a `FarmError`. What does surface is a configuration problem:
/// retrying would fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum FarmError {
    /// A setting is missing or out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Proxy rotation or backoff setup failed.
    #[error("configuration error: {0}")]
    Policy(#[from] PolicyError),

    /// The account API client or dialer could not be built for a proxy.
    #[error("client setup failed: {0}")]
    Client(String),
}
