//! Proxy URIs: parsing, credential extraction and log masking.
//!
//! A proxy is written as `scheme://[user:pass@]host:port`, with `user` and
//! `pass` percent-encoded when they contain reserved characters. The dialer
//! tunnels through `http://` (CONNECT), `socks4://` and `socks5://` proxies;
//! `https://` proxies are only usable by the HTTP client.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::TransportError;

/// The proxy protocol named by the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks4" => Some(Self::Socks4),
            "socks5" => Some(Self::Socks5),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
        }
    }

    /// Whether the WebSocket dialer can tunnel through this kind of proxy.
    pub fn is_tunnelable(self) -> bool {
        !matches!(self, Self::Https)
    }
}

/// A parsed proxy URI.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyUri {
    scheme: ProxyScheme,
    url: Url,
    username: Option<String>,
    password: Option<String>,
    host: String,
    port: u16,
}

impl ProxyUri {
    /// Parses a proxy URI. A missing scheme defaults to `http://`.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let raw = raw.trim();
        let parsed = if raw.contains("://") {
            Url::parse(raw)
        } else {
            Url::parse(&format!("http://{raw}"))
        };
        let url = parsed
            .map_err(|e| TransportError::UnsupportedProxy(format!("invalid proxy URI: {e}")))?;

        let scheme = ProxyScheme::from_scheme(url.scheme()).ok_or_else(|| {
            TransportError::UnsupportedProxy(format!("unknown scheme `{}`", url.scheme()))
        })?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TransportError::UnsupportedProxy("proxy host is empty".into()))?
            .to_owned();
        let port = url.port_or_known_default().ok_or_else(|| {
            TransportError::UnsupportedProxy("proxy address must be host:port".into())
        })?;

        let username = match url.username() {
            "" => None,
            user => Some(decode(user)?),
        };
        let password = url.password().map(decode).transpose()?;

        Ok(Self {
            scheme,
            url,
            username,
            password,
            host,
            port,
        })
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Decoded `user:pass` credentials, if any.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or("")))
    }

    /// `host:port` of the proxy itself.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Host reduced to its first and last three characters, for logging.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.host.chars().collect();
        if chars.len() > 6 {
            let head: String = chars[..3].iter().collect();
            let tail: String = chars[chars.len() - 3..].iter().collect();
            format!("{head}***{tail}")
        } else {
            let head: String = chars.iter().take(2).collect();
            format!("{head}***")
        }
    }
}

impl FromStr for ProxyUri {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn decode(component: &str) -> Result<String, TransportError> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| TransportError::UnsupportedProxy(format!("proxy credentials: {e}")))
}

/// Full URI with credentials still percent-encoded, so the output parses
/// back to the same proxy. Use [`ProxyUri::masked`] for logs.
impl fmt::Display for ProxyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme.as_str())?;
        if self.username.is_some() {
            write!(f, "{}:{}@", self.url.username(), self.url.password().unwrap_or(""))?;
        }
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Debug output never includes credentials.
impl fmt::Debug for ProxyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyUri")
            .field("scheme", &self.scheme)
            .field("host", &self.masked())
            .field("port", &self.port)
            .finish()
    }
}
