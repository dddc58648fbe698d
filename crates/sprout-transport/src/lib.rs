//! Transport abstraction layer for Sprout.
//!
//! Provides the [`Dialer`] and [`Connection`] traits that abstract over the
//! outbound text-frame channel a session runs on, plus [`ProxyUri`] for the
//! egress proxies a dialer can be bound to.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket dialer via `tokio-tungstenite`, with
//!   HTTP CONNECT and SOCKS4/5 proxy tunnelling

mod error;
mod proxy;
#[cfg(feature = "websocket")]
mod tunnel;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use proxy::{ProxyScheme, ProxyUri};
#[cfg(feature = "websocket")]
pub use websocket::{DialOptions, WebSocketConnection, WebSocketDialer};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound connections to a fixed endpoint.
///
/// A dialer is bound to at most one egress proxy for its whole life; switching
/// proxies means building a new dialer.
pub trait Dialer: Send + Sync + 'static {
    /// The connection type produced by this dialer.
    type Connection: Connection;

    /// Opens one connection. Each call is an independent attempt with a
    /// freshly generated handshake key.
    fn dial(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// The proxy this dialer tunnels through, if any.
    fn proxy(&self) -> Option<&ProxyUri>;
}

/// A single connection that exchanges UTF-8 text frames.
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the remote peer.
    fn send_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next text frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed the connection. Dropping the
    /// returned future before it completes loses no data.
    fn recv_text(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
