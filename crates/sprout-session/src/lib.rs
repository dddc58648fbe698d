//! Session lifecycle for Sprout.
//!
//! This crate drives one authenticated streaming session for one identity:
//!
//! 1. **Connect**: open the transport ([`Session::connect`])
//! 2. **Authenticate**: send a signed auth frame, cached or freshly
//!    generated ([`Session::authenticate`], [`Connector`])
//! 3. **Run**: dispatch inbound frames and keep the session alive with
//!    heartbeats until shutdown or failure ([`Session::run`], [`Dispatcher`])
//!
//! Every step is a single attempt. The orchestrator above decides when to
//! retry, how long to wait and whether to switch proxies.
//!
//! # How it fits in the stack
//!
//! ```text
//! Farm Layer (above)      ← runs sessions forever, backoff, proxy rotation
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol / Transport (below)
//! ```
//!
//! The seams the session calls out to are traits: [`Signer`],
//! [`AccountApi`], [`TokenStore`] and [`Clock`].

mod auth;
mod clock;
mod connector;
mod dispatcher;
mod error;
mod event;
mod runner;
mod session;
mod store;

pub use auth::{
    AccountApi, CHANNEL_CHAIN_ID, Identity, LOGIN_CHAIN_ID, SignedMessage, Signer, SiweMessage,
    login, sign_in,
};
pub use clock::{Clock, FixedClock, SystemClock, format_timestamp};
pub use connector::{AuthSource, Connector, open};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{AccountError, SessionError, SignError, StoreError};
pub use event::{EventSink, SessionEvent, SharedSink};
pub use runner::{Session, SessionOutcome};
pub use session::{DEFAULT_EXTENSION_ID, SessionConfig, SessionState};
pub use store::{MemoryTokenStore, TokenStore};
