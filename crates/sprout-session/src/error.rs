//! Error types for the session layer.

use std::time::Duration;

use sprout_policy::{Classify, FailureClass};
use sprout_protocol::ProtocolError;
use sprout_transport::TransportError;

use crate::SessionState;

/// Errors that end a session attempt.
///
/// Every variant except [`Shutdown`](Self::Shutdown) is recoverable from the
/// orchestrator's point of view: it waits, maybe rotates the proxy, and
/// builds a new session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connect, send, receive, or handshake failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The server sent a frame that is not valid JSON.
    #[error("malformed frame: {0}")]
    Protocol(#[from] ProtocolError),

    /// Fetching a nonce or logging in failed.
    #[error("account api: {0}")]
    Account(#[from] AccountError),

    /// The signer could not produce a signature.
    #[error(transparent)]
    Sign(#[from] SignError),

    /// No auth-ack carrying a session token arrived in time.
    #[error("authentication not acknowledged within {0:?}")]
    AuthRejected(Duration),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ClosedByPeer,

    /// An operation was called in a state that doesn't allow it.
    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    /// Shutdown was requested while the operation was in flight.
    #[error("shutdown requested")]
    Shutdown,
}

impl SessionError {
    /// How the orchestrator should pace the retry after this error.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transport(err) if err.is_rate_limited() => FailureClass::RateLimited,
            Self::Account(err) => err.class(),
            _ => FailureClass::Generic,
        }
    }
}

impl Classify for SessionError {
    fn class(&self) -> FailureClass {
        SessionError::class(self)
    }
}

/// Errors returned by an [`AccountApi`](crate::AccountApi).
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The request never produced a response (DNS, TLS, proxy, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The API answered 429.
    #[error("rate limited (429)")]
    RateLimited,

    /// The API answered 401 to an authenticated call.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body didn't have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AccountError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited | Self::Status { status: 429, .. } => FailureClass::RateLimited,
            Self::Request(msg) if msg.contains("429") => FailureClass::RateLimited,
            _ => FailureClass::Generic,
        }
    }
}

impl Classify for AccountError {
    fn class(&self) -> FailureClass {
        AccountError::class(self)
    }
}

/// Errors returned by a [`Signer`](crate::Signer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    /// The key material could not be parsed.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Signing itself failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Errors returned by a [`TokenStore`](crate::TokenStore).
///
/// Callers in this crate never propagate these: a failed read is treated as
/// "absent" and a failed write is logged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("store corrupt: {0}")]
    Corrupt(String),
}
