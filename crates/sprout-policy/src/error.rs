//! Error types for the policy layer.

/// Errors raised while building or applying a policy.
///
/// Both variants are configuration problems: they are fatal to the
/// orchestrator that hit them and are never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// Proxy rotation was asked for a proxy but the pool is empty.
    #[error("no proxies available for rotation")]
    EmptyPool,

    /// Backoff parameters are out of range.
    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),
}
