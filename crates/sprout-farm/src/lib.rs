//! Farming supervision for Sprout.
//!
//! This crate sits on top of the session layer and owns every long-running
//! decision:
//!
//! - [`Orchestrator`]: keeps one identity farming forever: runs sessions,
//!   applies backoff on failure, cools down and rotates proxies when retries
//!   on one proxy are exhausted.
//! - [`FleetSupervisor`]: runs one orchestrator per account under a
//!   concurrency limit with a randomized start delay.
//! - [`FarmConfig`]: the `[retry]`, `[session]` and `[fleet]` settings.
//!
//! Only configuration errors stop an identity; everything else leads to a
//! bounded wait and another attempt.

mod config;
mod error;
mod event;
mod fleet;
mod orchestrator;

pub use config::{
    FarmConfig, FleetConfig, OrchestratorConfig, RetryConfig, SessionTimings, StartDelay,
};
pub use error::FarmError;
pub use event::{FarmEvent, FarmEventKind, FarmEvents};
pub use fleet::{FarmExit, FleetReport, FleetSupervisor};
pub use orchestrator::{AttemptCounter, ClientFactory, CycleOutcome, FarmSummary, Orchestrator};
