//! Wall-clock source for timestamps that end up on the wire.
//!
//! Monotonic timing (heartbeats, timeouts, waits) uses `tokio::time`
//! directly. Only the signed message's `Issued At` needs calendar time, and
//! it comes from a [`Clock`] so tests can pin it.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// RFC 3339 in UTC with millisecond precision and a `Z` suffix,
/// e.g. `2025-05-01T12:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
