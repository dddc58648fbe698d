//! WebSocket dialer implementation using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, generate_key};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    CACHE_CONTROL, ORIGIN, PRAGMA, SEC_WEBSOCKET_KEY, USER_AGENT,
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Dialer, ProxyUri, TransportError, tunnel};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Request decoration and limits applied to every dial attempt.
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// `Origin` header sent with the upgrade request.
    pub origin: Option<String>,
    /// `User-Agent` header sent with the upgrade request.
    pub user_agent: Option<String>,
    /// Upper bound on TCP connect + proxy tunnel + TLS + upgrade.
    pub connect_timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            origin: None,
            user_agent: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// A [`Dialer`] that opens WebSocket connections to one endpoint, optionally
/// through an HTTP CONNECT or SOCKS proxy.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    endpoint: String,
    options: DialOptions,
    proxy: Option<ProxyUri>,
}

impl WebSocketDialer {
    /// Creates a dialer for `endpoint` (`ws://` or `wss://`).
    pub fn new(endpoint: impl Into<String>, options: DialOptions) -> Self {
        Self {
            endpoint: endpoint.into(),
            options,
            proxy: None,
        }
    }

    /// Binds the dialer to an egress proxy.
    pub fn with_proxy(mut self, proxy: Option<ProxyUri>) -> Self {
        self.proxy = proxy;
        self
    }

    /// The endpoint this dialer connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the upgrade request with a fresh `Sec-WebSocket-Key`.
    fn build_request(&self) -> Result<Request, TransportError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(SEC_WEBSOCKET_KEY, header_value(&generate_key())?);
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(origin) = &self.options.origin {
            headers.insert(ORIGIN, header_value(origin)?);
        }
        if let Some(agent) = &self.options.user_agent {
            headers.insert(USER_AGENT, header_value(agent)?);
        }
        Ok(request)
    }

    async fn open(&self, request: Request) -> Result<WsStream, TransportError> {
        let uri = request.uri();
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidEndpoint("endpoint has no host".into()))?
            .to_string();
        let secure = uri.scheme_str() == Some("wss");
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        let stream = match &self.proxy {
            Some(proxy) => tunnel::open(proxy, &host, port).await?,
            None => TcpStream::connect((host.as_str(), port))
                .await
                .map_err(TransportError::ConnectFailed)?,
        };

        let (ws, _response) = tokio_tungstenite::client_async_tls(request, stream)
            .await
            .map_err(map_handshake_error)?;
        Ok(ws)
    }
}

impl Dialer for WebSocketDialer {
    type Connection = WebSocketConnection;

    async fn dial(&self) -> Result<Self::Connection, TransportError> {
        let request = self.build_request()?;
        let timeout = self.options.connect_timeout;

        let ws = tokio::time::timeout(timeout, self.open(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        let conn = WebSocketConnection::new(ws);
        tracing::debug!(
            id = %conn.id,
            endpoint = %self.endpoint,
            proxy = ?self.proxy.as_ref().map(ProxyUri::masked),
            "WebSocket connected"
        );
        Ok(conn)
    }

    fn proxy(&self) -> Option<&ProxyUri> {
        self.proxy.as_ref()
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidEndpoint(format!("invalid header value: {e}")))
}

fn map_handshake_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => TransportError::HandshakeRejected {
            status: response.status().as_u16(),
        },
        WsError::Io(e) => TransportError::ConnectFailed(e),
        other => TransportError::HandshakeFailed(other.to_string()),
    }
}

/// A single client-side WebSocket connection.
///
/// The write and read halves are locked independently so a pending receive
/// never blocks an outbound frame.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn new(ws: WsStream) -> Self {
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        let (sink, stream) = ws.split();
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for WebSocketConnection {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::text(text.to_owned()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn recv_text(&self) -> Result<Option<String>, TransportError> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|e| TransportError::InvalidFrame(e.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
