//! Production [`ClientFactory`]: reqwest for the account API, WebSocket for
//! the streaming channel, both bound to the same proxy.

use std::time::Duration;

use sprout_farm::{ClientFactory, FarmError};
use sprout_transport::{DialOptions, ProxyUri, WebSocketDialer};

use crate::{HttpAccountApi, ServiceConfig};

/// Builds an account API client and a WebSocket dialer bound to the same
/// proxy. `https://` proxies are refused since the dialer cannot use them.
#[derive(Debug, Clone)]
pub struct SproutBackend {
    service: ServiceConfig,
    connect_timeout: Duration,
}

impl SproutBackend {
    pub fn new(service: ServiceConfig, connect_timeout: Duration) -> Self {
        Self {
            service,
            connect_timeout,
        }
    }

    fn dial_options(&self) -> DialOptions {
        DialOptions {
            origin: Some(self.service.origin()),
            user_agent: Some(self.service.user_agent.clone()),
            connect_timeout: self.connect_timeout,
        }
    }
}

impl ClientFactory for SproutBackend {
    type Api = HttpAccountApi;
    type Dialer = WebSocketDialer;

    fn build(&self, proxy: Option<&ProxyUri>) -> Result<(HttpAccountApi, WebSocketDialer), FarmError> {
        if let Some(proxy) = proxy.filter(|p| !p.scheme().is_tunnelable()) {
            return Err(FarmError::Configuration(format!(
                "proxy {} cannot carry the streaming channel (https:// proxies are not supported)",
                proxy.masked()
            )));
        }
        let api = HttpAccountApi::new(&self.service, proxy)
            .map_err(|e| FarmError::Client(e.to_string()))?;
        let dialer = WebSocketDialer::new(self.service.ws_url.as_str(), self.dial_options())
            .with_proxy(proxy.cloned());
        Ok((api, dialer))
    }
}
