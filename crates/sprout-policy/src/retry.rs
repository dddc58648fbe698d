//! Generic retry loop for request/reply operations.
//!
//! The session engine never retries internally; its orchestrator owns that
//! decision. This helper is for one-shot operations outside the engine, such
//! as fetching account info for an operator.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{BackoffPolicy, FailureClass, wait};

/// Errors that know how they should be paced.
pub trait Classify {
    fn class(&self) -> FailureClass;
}

/// Why [`retry`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Shutdown was requested; not a failure.
    #[error("cancelled by shutdown")]
    Cancelled,

    /// Every attempt failed. `last` is the final attempt's error.
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

/// Runs `op` up to `max_attempts` times (at least once).
///
/// `op` receives the 1-based attempt number. Between failures the loop waits
/// `policy.delay(attempt, err.class())`, and returns
/// [`RetryError::Cancelled`] as soon as `shutdown` fires.
pub async fn retry<T, E, F, Fut>(
    policy: &BackoffPolicy,
    max_attempts: u32,
    shutdown: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if shutdown.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            tracing::warn!(attempts = attempt, error = %err, "operation failed, giving up");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let ctx = policy.context(attempt, err.class());
        tracing::warn!(
            attempt,
            max_attempts,
            class = ?ctx.class,
            delay_ms = ctx.delay_ms(),
            error = %err,
            "operation failed, retrying"
        );
        if wait(ctx.delay, shutdown).await.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
    }
}
