//! Cancellable waits.
//!
//! Every backoff, cooldown and start delay goes through [`wait`], which races
//! the timer against the shared shutdown token so an operator stop takes
//! effect immediately instead of after the full delay.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How a [`wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed.
    Elapsed,
    /// Shutdown was requested before (or during) the wait.
    Cancelled,
}

impl WaitOutcome {
    pub fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Sleeps for `duration` unless `shutdown` fires first.
pub async fn wait(duration: Duration, shutdown: &CancellationToken) -> WaitOutcome {
    if shutdown.is_cancelled() {
        return WaitOutcome::Cancelled;
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => WaitOutcome::Cancelled,
        _ = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
    }
}
