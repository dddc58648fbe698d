//! Transport errors, with the HTTP status kept wherever the peer or the
//! proxy answered with one.

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL could not be turned into a connect request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The proxy URI is malformed or uses a scheme the dialer cannot tunnel.
    #[error("unsupported proxy: {0}")]
    UnsupportedProxy(String),

    /// Opening the TCP stream (directly or to the proxy) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The proxy refused the CONNECT tunnel.
    #[error("proxy tunnel rejected with status {status}")]
    TunnelRejected {
        /// HTTP status returned by the proxy.
        status: u16,
    },

    /// The SOCKS proxy refused or garbled the handshake.
    #[error("socks proxy failed: {0}")]
    SocksFailed(String),

    /// The server answered the upgrade request with a non-101 status.
    #[error("handshake rejected with status {status}")]
    HandshakeRejected {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// The WebSocket handshake failed for a reason other than a status reply.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Opening the connection took longer than the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A frame arrived that is not valid UTF-8 text.
    #[error("non-text frame: {0}")]
    InvalidFrame(String),
}

impl TransportError {
    /// HTTP status carried by the error, if the peer or proxy replied with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TunnelRejected { status } | Self::HandshakeRejected { status } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether the remote side signalled rate limiting (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429) || self.to_string().contains("429")
    }
}
