//! Resilience policies for Sprout.
//!
//! - [`BackoffPolicy`]: pure delay function: attempt count + failure class
//!   → wait duration.
//! - [`ProxyRotation`]: stateful selector over a proxy pool with a
//!   per-cycle used set.
//! - [`wait`]: a sleep that returns early when the shutdown token fires.
//! - [`retry`]: a bounded retry loop built from the three above.
//!
//! # Integration
//!
//! The orchestrator owns one `ProxyRotation` and one attempt counter, and
//! asks the policy how long to wait after each failed session:
//!
//! ```ignore
//! attempts += 1;
//! let ctx = backoff.context(attempts, err.class());
//! if wait(ctx.delay, &shutdown).await.is_cancelled() {
//!     return;
//! }
//! ```

mod backoff;
mod error;
mod proxy;
mod retry;
mod wait;

pub use backoff::{BackoffPolicy, FailureClass, RetryContext, saturating_millis};
pub use error::PolicyError;
pub use proxy::ProxyRotation;
pub use retry::{Classify, RetryError, retry};
pub use wait::{WaitOutcome, wait};

/// Shutdown signal shared by every task in a fleet.
pub use tokio_util::sync::CancellationToken;
