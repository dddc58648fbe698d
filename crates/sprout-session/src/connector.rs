//! Session connector: open the transport, prepare the auth payload.
//!
//! Each step is a single attempt. Retrying, waiting and proxy rotation all
//! belong to the orchestrator.
//!
//! The auth payload has two sources:
//!
//! - **cached**: a payload persisted by an earlier session, replayed
//!   verbatim (no nonce round-trip);
//! - **generated**: nonce from the account API, message built for
//!   [`CHANNEL_CHAIN_ID`], signed, then persisted for later reconnects.

use sprout_policy::CancellationToken;
use sprout_protocol::{AuthData, Codec, JsonCodec};
use sprout_transport::Dialer;

use crate::store::{log_write, or_absent};
use crate::{AccountApi, CHANNEL_CHAIN_ID, Clock, SessionError, Signer, TokenStore, sign_in};

/// Where an auth payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Cached,
    Generated,
}

/// Opens one connection, giving up as soon as `shutdown` fires.
pub async fn open<D: Dialer>(
    dialer: &D,
    shutdown: &CancellationToken,
) -> Result<D::Connection, SessionError> {
    if shutdown.is_cancelled() {
        return Err(SessionError::Shutdown);
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(SessionError::Shutdown),
        result = dialer.dial() => Ok(result?),
    }
}

/// Everything needed to produce a signed auth payload for one identity.
pub struct Connector<'a, A, T> {
    pub signer: &'a dyn Signer,
    pub api: &'a A,
    pub store: &'a T,
    pub clock: &'a dyn Clock,
    pub extension_id: &'a str,
}

impl<A: AccountApi, T: TokenStore> Connector<'_, A, T> {
    /// Returns the auth payload to send, preferring a cached one.
    ///
    /// A cached entry that no longer parses is treated as absent.
    pub async fn payload(&self) -> Result<(AuthData, AuthSource), SessionError> {
        let identity = self.signer.identity();

        let cached = or_absent(identity, "auth message", self.store.auth_message(identity).await);
        if let Some(text) = cached {
            match JsonCodec.decode::<AuthData>(&text) {
                Ok(data) => {
                    tracing::debug!(%identity, "replaying cached auth payload");
                    return Ok((data, AuthSource::Cached));
                }
                Err(err) => {
                    tracing::warn!(%identity, error = %err, "cached auth payload unreadable, regenerating");
                }
            }
        }

        let signed = sign_in(
            self.api,
            self.signer,
            self.clock,
            self.extension_id,
            CHANNEL_CHAIN_ID,
        )
        .await?;
        let data = signed.into_auth_data(identity);

        match JsonCodec.encode(&data) {
            Ok(text) => log_write(
                identity,
                "auth message",
                self.store.put_auth_message(identity, &text).await,
            ),
            Err(err) => tracing::warn!(%identity, error = %err, "auth payload not persisted"),
        }
        tracing::debug!(%identity, "generated fresh auth payload");
        Ok((data, AuthSource::Generated))
    }
}
