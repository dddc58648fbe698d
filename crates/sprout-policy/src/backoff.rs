//! Backoff policy: how long to wait before retry attempt `k`.
//!
//! ```text
//! Generic      delay(k) = base * multiplier^(k-1)     5s, 10s, 20s, 40s, ...
//! RateLimited  delay(k) = rate_limit_delay            60s, 60s, 60s, ...
//! ```
//!
//! The policy is a pure function of its inputs. Waiting is the caller's job
//! (see [`wait`](crate::wait)).

use std::time::Duration;

use crate::PolicyError;

/// How a failure should be paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailureClass {
    /// Any transient failure: exponential backoff.
    #[default]
    Generic,
    /// The remote side answered 429: fixed, longer delay.
    RateLimited,
}

/// Everything known about one retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// 1-based count of consecutive failures so far.
    pub attempt: u32,
    /// How long to wait before the next attempt.
    pub delay: Duration,
    /// Classification of the failure that produced this context.
    pub class: FailureClass,
}

impl RetryContext {
    /// [`RetryContext::delay`] in whole milliseconds, for log fields.
    pub fn delay_ms(&self) -> u64 {
        saturating_millis(self.delay)
    }
}

/// Whole milliseconds in `duration`, pinned to `u64::MAX` when it does not fit.
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Delay-growth function between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: f64,
    rate_limit_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            multiplier: 2.0,
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    /// [`PolicyError::InvalidBackoff`] if `base` is zero or `multiplier` is
    /// not a finite number `>= 1.0`.
    pub fn new(
        base: Duration,
        multiplier: f64,
        rate_limit_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if base.is_zero() {
            return Err(PolicyError::InvalidBackoff("base delay must be > 0".into()));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(PolicyError::InvalidBackoff(format!(
                "multiplier must be >= 1.0, got {multiplier}"
            )));
        }
        Ok(Self {
            base,
            multiplier,
            rate_limit_delay,
        })
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// Delay before retrying after the `attempt`-th consecutive failure.
    ///
    /// `attempt` is 1-based; 0 is treated as 1. Growth saturates at
    /// `Duration::MAX` instead of overflowing.
    pub fn delay(&self, attempt: u32, class: FailureClass) -> Duration {
        match class {
            FailureClass::RateLimited => self.rate_limit_delay,
            FailureClass::Generic => {
                let exponent = attempt.max(1) - 1;
                let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
                let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
        }
    }

    /// Bundles the delay for `attempt` with its inputs.
    pub fn context(&self, attempt: u32, class: FailureClass) -> RetryContext {
        RetryContext {
            attempt,
            delay: self.delay(attempt, class),
            class,
        }
    }
}
