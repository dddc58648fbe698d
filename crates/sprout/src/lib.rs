//! # Sprout
//!
//! Resilient multi-account farming client for a rewards streaming service.
//!
//! Each account keeps one authenticated WebSocket session open, answering
//! with heartbeats and recording points updates. Failures are retried with
//! backoff, exhausted proxies are cooled down and rotated, and a single
//! shutdown token stops every account promptly.
//!
//! This crate wires the layers together with production implementations of
//! their seams:
//!
//! - [`HttpAccountApi`]: nonce and login over HTTP (reqwest)
//! - [`LocalSigner`]: in-memory key, EIP-191 signatures (alloy)
//! - [`JsonFileStore`]: credential cache in a JSON file
//! - [`SproutBackend`]: builds the API client and dialer for a proxy
//! - [`AppConfig`]: the TOML config file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use sprout::prelude::*;
//!
//! # async fn run() -> Result<(), SproutError> {
//! let config = AppConfig::load(Path::new("config/config.toml"))?;
//! let accounts = load_signers(Path::new("config/data/farm.txt"))?;
//! let proxies = load_proxies(Path::new("config/data/proxy.txt"))?;
//! let backend = SproutBackend::new(
//!     config.service.clone(),
//!     std::time::Duration::from_secs(config.session.connect_timeout),
//! );
//! let fleet = FleetSupervisor::new(
//!     &config.farm(),
//!     &config.service.extension_id,
//!     Arc::new(backend),
//!     Arc::new(JsonFileStore::new("data/tokens.json")),
//!     Arc::new(SystemClock),
//!     proxies,
//! )?;
//! let shutdown = CancellationToken::new();
//! let report = fleet.run(accounts, &shutdown).await;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod error;
mod http;
mod loader;
mod signer;
mod store;
pub mod telemetry;

pub use backend::SproutBackend;
pub use config::{AppConfig, DEFAULT_CONFIG_PATH, LoggingConfig, ServiceConfig};
pub use error::SproutError;
pub use http::{HttpAccountApi, fetch_user_info};
pub use loader::{load_proxies, load_signers, parse_accounts, parse_proxies};
pub use signer::LocalSigner;
pub use store::JsonFileStore;

/// Re-exports everything needed to run a fleet.
pub mod prelude {
    pub use sprout_farm::{
        FarmConfig, FarmEvent, FarmEventKind, FarmExit, FleetReport, FleetSupervisor,
        Orchestrator,
    };
    pub use sprout_policy::{BackoffPolicy, CancellationToken, FailureClass};
    pub use sprout_protocol::{InboundFrame, OutboundFrame, PointsUpdate};
    pub use sprout_session::{
        Identity, Session, SessionConfig, SessionEvent, SessionState, Signer, SystemClock,
        TokenStore,
    };
    pub use sprout_transport::ProxyUri;

    pub use crate::{
        AppConfig, HttpAccountApi, JsonFileStore, LocalSigner, SproutBackend, SproutError,
        load_proxies, load_signers,
    };
}
