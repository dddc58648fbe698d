//! HTTP client for the account API.
//!
//! Each client is bound to one egress proxy for its whole life, like the
//! streaming dialer built next to it. Responses are wrapped in a
//! `{"success": bool, "data": ...}` envelope.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, ORIGIN};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sprout_session::{
    AccountApi, AccountError, Clock, Identity, SignedMessage, Signer, TokenStore, login,
};
use sprout_transport::ProxyUri;

use crate::ServiceConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in an [`AccountError::Status`].
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NonceData {
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

/// Account API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAccountApi {
    client: Client,
    base: String,
}

impl HttpAccountApi {
    /// Builds a client for `service`, tunnelling through `proxy` if given.
    pub fn new(service: &ServiceConfig, proxy: Option<&ProxyUri>) -> Result<Self, AccountError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        let origin = HeaderValue::from_str(&service.origin())
            .map_err(|e| AccountError::Request(format!("invalid origin header: {e}")))?;
        headers.insert(ORIGIN, origin);

        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(service.user_agent.as_str())
            .default_headers(headers);
        match proxy {
            Some(proxy) => {
                // reqwest decodes the percent-encoded userinfo itself.
                let egress = reqwest::Proxy::all(proxy.to_string())
                    .map_err(|e| AccountError::Request(format!("invalid proxy: {e}")))?;
                builder = builder.proxy(egress);
            }
            // Direct means direct: ignore HTTP(S)_PROXY from the environment.
            None => builder = builder.no_proxy(),
        }
        let client = builder
            .build()
            .map_err(|e| AccountError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base: service.api_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Fetches the account summary with a bearer token.
    pub async fn user_info(&self, bearer: &str) -> Result<serde_json::Value, AccountError> {
        let request = self
            .client
            .get(format!("{}/userInfo", self.base))
            .header(AUTHORIZATION, format!("Bearer {bearer}"));
        read(send(request).await?).await
    }
}

impl AccountApi for HttpAccountApi {
    async fn nonce(&self, identity: &Identity) -> Result<String, AccountError> {
        let request = self
            .client
            .get(format!("{}/{}/nonce", self.base, identity.address()))
            .header(AUTHORIZATION, "Bearer null");
        let data: NonceData = read(send(request).await?).await?;
        Ok(data.nonce)
    }

    async fn login(&self, signed: &SignedMessage) -> Result<String, AccountError> {
        let body = serde_json::json!({
            "message": signed.message,
            "signature": signed.signature,
        });
        let request = self
            .client
            .post(format!("{}/login", self.base))
            .header(AUTHORIZATION, "Bearer null")
            .json(&body);
        let data: LoginData = read(send(request).await?).await?;
        Ok(data.token)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, AccountError> {
    request.send().await.map_err(|e| match e.status() {
        Some(StatusCode::TOO_MANY_REQUESTS) => AccountError::RateLimited,
        _ => AccountError::Request(e.to_string()),
    })
}

/// Maps the status, then unwraps the success envelope.
async fn read<T: DeserializeOwned>(response: Response) -> Result<T, AccountError> {
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => return Err(AccountError::RateLimited),
        StatusCode::UNAUTHORIZED => return Err(AccountError::Unauthorized),
        s if !s.is_success() => {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(AccountError::Status {
                status: s.as_u16(),
                body,
            });
        }
        _ => {}
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| AccountError::InvalidResponse(e.to_string()))?;
    if !envelope.success {
        return Err(AccountError::InvalidResponse(
            envelope.message.unwrap_or_else(|| "success=false".into()),
        ));
    }
    envelope
        .data
        .ok_or_else(|| AccountError::InvalidResponse("missing data".into()))
}

/// Fetches the account summary for `signer`, logging in when no bearer
/// token is cached and once more if the cached one is rejected.
pub async fn fetch_user_info<T: TokenStore>(
    api: &HttpAccountApi,
    signer: &dyn Signer,
    clock: &dyn Clock,
    store: &T,
    extension_id: &str,
) -> Result<serde_json::Value, AccountError> {
    let identity = signer.identity();
    let cached = store.token(identity).await.unwrap_or_else(|err| {
        tracing::warn!(%identity, error = %err, "reading bearer token failed, treating as absent");
        None
    });

    if let Some(token) = cached {
        match api.user_info(&token).await {
            Err(AccountError::Unauthorized) => {
                tracing::info!(%identity, "bearer token rejected, logging in again");
            }
            other => return other,
        }
    }

    let token = relogin(api, signer, clock, store, extension_id).await?;
    api.user_info(&token).await
}

async fn relogin<T: TokenStore>(
    api: &HttpAccountApi,
    signer: &dyn Signer,
    clock: &dyn Clock,
    store: &T,
    extension_id: &str,
) -> Result<String, AccountError> {
    let token = match login(api, signer, clock, extension_id).await {
        Ok(token) => token,
        Err(sprout_session::SessionError::Account(err)) => return Err(err),
        Err(err) => return Err(AccountError::Request(err.to_string())),
    };
    if let Err(err) = store.put_token(signer.identity(), &token).await {
        tracing::warn!(identity = %signer.identity(), error = %err, "persisting bearer token failed");
    }
    Ok(token)
}
