//! Tunnelling through an egress proxy: HTTP CONNECT for `http://` proxies,
//! the SOCKS handshake for `socks4://` and `socks5://`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};

use crate::{ProxyScheme, ProxyUri, TransportError};

/// Upper bound on the proxy's reply head. Anything longer is not a proxy.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Connects to `proxy` and asks it to open a tunnel to `host:port`.
///
/// On success the returned stream is a raw byte pipe to the target; TLS and
/// the WebSocket handshake run on top of it.
pub(crate) async fn open(
    proxy: &ProxyUri,
    host: &str,
    port: u16,
) -> Result<TcpStream, TransportError> {
    let stream = match proxy.scheme() {
        ProxyScheme::Http => {
            let mut stream = TcpStream::connect(proxy.address())
                .await
                .map_err(TransportError::ConnectFailed)?;
            handshake(&mut stream, proxy, host, port).await?;
            stream
        }
        ProxyScheme::Socks5 => socks5(proxy, host, port).await?,
        ProxyScheme::Socks4 => socks4(proxy, host, port).await?,
        ProxyScheme::Https => {
            return Err(TransportError::UnsupportedProxy(format!(
                "{proxy:?} cannot be tunnelled (https:// proxies are not supported by the dialer)"
            )));
        }
    };

    tracing::trace!(proxy = %proxy.masked(), host, port, "proxy tunnel established");
    Ok(stream)
}

async fn socks5(proxy: &ProxyUri, host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let address = proxy.address();
    let stream = match proxy.credentials() {
        Some((user, pass)) => {
            Socks5Stream::connect_with_password(address.as_str(), (host, port), user, pass).await
        }
        None => Socks5Stream::connect(address.as_str(), (host, port)).await,
    }
    .map_err(socks_error)?;
    Ok(stream.into_inner())
}

async fn socks4(proxy: &ProxyUri, host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let address = proxy.address();
    let stream = match proxy.credentials() {
        Some((user, _)) => {
            Socks4Stream::connect_with_userid(address.as_str(), (host, port), user).await
        }
        None => Socks4Stream::connect(address.as_str(), (host, port)).await,
    }
    .map_err(socks_error)?;
    Ok(stream.into_inner())
}

fn socks_error(err: tokio_socks::Error) -> TransportError {
    match err {
        tokio_socks::Error::Io(e) => TransportError::ConnectFailed(e),
        other => TransportError::SocksFailed(other.to_string()),
    }
}

async fn handshake<S>(
    stream: &mut S,
    proxy: &ProxyUri,
    host: &str,
    port: u16,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = connect_request(proxy, host, port);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(TransportError::ConnectFailed)?;

    let head = read_response_head(stream).await?;
    match parse_status(&head)? {
        200..=299 => Ok(()),
        status => Err(TransportError::TunnelRejected { status }),
    }
}

fn connect_request(proxy: &ProxyUri, host: &str, port: u16) -> String {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some((user, pass)) = proxy.credentials() {
        let token = STANDARD.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    request
}

async fn read_response_head<S>(stream: &mut S) -> Result<Vec<u8>, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(TransportError::HandshakeFailed(
                "proxy reply head too large".into(),
            ));
        }
        let byte = stream.read_u8().await.map_err(TransportError::ConnectFailed)?;
        head.push(byte);
    }
    Ok(head)
}

fn parse_status(head: &[u8]) -> Result<u16, TransportError> {
    let text = String::from_utf8_lossy(head);
    let status_line = text.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => {
            code.parse().map_err(|_| {
                TransportError::HandshakeFailed(format!("bad proxy status line: {status_line}"))
            })
        }
        _ => Err(TransportError::HandshakeFailed(format!(
            "bad proxy status line: {status_line}"
        ))),
    }
}
