//! Farming configuration.
//!
//! Deserialized from the `[retry]`, `[session]` and `[fleet]` tables of the
//! config file. Every key is optional; [`FarmConfig::validate`] rejects
//! out-of-range values before anything starts.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sprout_policy::BackoffPolicy;
use sprout_session::SessionConfig;

use crate::FarmError;

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Backoff, cooldown and rotation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Consecutive failures tolerated on one proxy before the cooldown.
    pub max_attempts: u32,

    /// Base backoff delay in seconds.
    pub delay_seconds: u64,

    /// Growth factor between backoff delays.
    pub backoff_multiplier: f64,

    /// Fixed delay in seconds after a rate-limited failure.
    pub rate_limit_delay: u64,

    /// Cooldown in seconds after `max_attempts` failures.
    pub farming_wait_seconds: u64,

    /// Switch to another proxy after the cooldown.
    pub proxy_rotation: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 5,
            backoff_multiplier: 2.0,
            rate_limit_delay: 60,
            farming_wait_seconds: 60,
            proxy_rotation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionTimings
// ---------------------------------------------------------------------------

/// Per-session timings, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    pub heartbeat_interval: u64,
    pub receive_timeout: u64,
    pub auth_ack_timeout: u64,
    pub connect_timeout: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval: 30,
            receive_timeout: 45,
            auth_ack_timeout: 60,
            connect_timeout: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// FleetConfig
// ---------------------------------------------------------------------------

/// Inclusive range of seconds to wait before an account starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StartDelay {
    pub min: u64,
    pub max: u64,
}

impl Default for StartDelay {
    fn default() -> Self {
        Self { min: 0, max: 10 }
    }
}

/// Fleet-wide limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// How many accounts farm at the same time.
    pub threads: usize,
    pub delay_before_start: StartDelay,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            threads: 3,
            delay_before_start: StartDelay::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// FarmConfig
// ---------------------------------------------------------------------------

/// Everything the farm layer reads from configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    pub retry: RetryConfig,
    pub session: SessionTimings,
    pub fleet: FleetConfig,
}

impl FarmConfig {
    /// Checks every range constraint.
    pub fn validate(&self) -> Result<(), FarmError> {
        let retry = &self.retry;
        if retry.max_attempts < 1 {
            return Err(FarmError::Configuration(
                "retry.max_attempts must be >= 1".into(),
            ));
        }
        self.backoff()?;

        let s = &self.session;
        for (name, value) in [
            ("session.heartbeat_interval", s.heartbeat_interval),
            ("session.receive_timeout", s.receive_timeout),
            ("session.auth_ack_timeout", s.auth_ack_timeout),
            ("session.connect_timeout", s.connect_timeout),
        ] {
            if value == 0 {
                return Err(FarmError::Configuration(format!("{name} must be > 0")));
            }
        }

        if self.fleet.threads == 0 {
            return Err(FarmError::Configuration("fleet.threads must be >= 1".into()));
        }
        let delay = self.fleet.delay_before_start;
        if delay.min > delay.max {
            return Err(FarmError::Configuration(format!(
                "fleet.delay_before_start: min ({}) > max ({})",
                delay.min, delay.max
            )));
        }
        Ok(())
    }

    /// The backoff policy described by `[retry]`.
    pub fn backoff(&self) -> Result<BackoffPolicy, FarmError> {
        Ok(BackoffPolicy::new(
            Duration::from_secs(self.retry.delay_seconds),
            self.retry.backoff_multiplier,
            Duration::from_secs(self.retry.rate_limit_delay),
        )?)
    }

    /// Session settings for sessions signing in as `extension_id`.
    pub fn session_config(&self, extension_id: &str) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(self.session.heartbeat_interval),
            receive_timeout: Duration::from_secs(self.session.receive_timeout),
            auth_ack_timeout: Duration::from_secs(self.session.auth_ack_timeout),
            extension_id: extension_id.to_owned(),
        }
    }

    /// Validates and converts into the per-orchestrator settings.
    pub fn orchestrator_config(
        &self,
        extension_id: &str,
    ) -> Result<OrchestratorConfig, FarmError> {
        self.validate()?;
        Ok(OrchestratorConfig {
            backoff: self.backoff()?,
            max_attempts: self.retry.max_attempts,
            farming_wait: Duration::from_secs(self.retry.farming_wait_seconds),
            proxy_rotation: self.retry.proxy_rotation,
            session: Arc::new(self.session_config(extension_id)),
        })
    }
}

/// Validated settings for one [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub backoff: BackoffPolicy,
    pub max_attempts: u32,
    pub farming_wait: Duration,
    pub proxy_rotation: bool,
    pub session: Arc<SessionConfig>,
}
