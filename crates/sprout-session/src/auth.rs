//! Identity, signing and the account API seam.
//!
//! Sprout doesn't implement key management or the account service itself.
//! It defines two traits the session layer calls into:
//!
//! - [`Signer`]: owns the private key, exposes the [`Identity`] and signs
//!   messages (EIP-191 personal-sign in production).
//! - [`AccountApi`]: request/reply calls to the rewards service: fetch a
//!   login nonce and exchange a signed message for a bearer token.
//!
//! Both signed flows share one message layout ([`SiweMessage`]); only the
//! chain id differs between the streaming channel and HTTP login.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use sprout_protocol::AuthData;

use crate::clock::format_timestamp;
use crate::{AccountError, Clock, SessionError, SignError};

/// Chain id embedded in the auth frame sent over the streaming channel.
pub const CHANNEL_CHAIN_ID: u64 = 1;

/// Chain id embedded in the message exchanged for a bearer token.
pub const LOGIN_CHAIN_ID: u64 = 42000;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An account address derived from a private signing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as it appears on the wire.
    pub fn address(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Holds a private key and signs messages with it.
pub trait Signer: Send + Sync + 'static {
    /// The identity derived from the key.
    fn identity(&self) -> &Identity;

    /// Signs `message`, returning a `0x`-prefixed hex signature.
    fn sign_message(&self, message: &str) -> Result<String, SignError>;
}

/// Request/reply access to the rewards service's account endpoints.
///
/// Implementations decide transport details (HTTP client, proxy binding,
/// the `Bearer null` header). A 401 on an authenticated call is handled by
/// the implementation with one re-login, never by the session engine.
pub trait AccountApi: Send + Sync + 'static {
    /// Fetches a fresh single-use login nonce for `identity`.
    fn nonce(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<String, AccountError>> + Send;

    /// Exchanges a signed message for a bearer token.
    fn login(
        &self,
        signed: &SignedMessage,
    ) -> impl Future<Output = Result<String, AccountError>> + Send;
}

// ---------------------------------------------------------------------------
// SiweMessage
// ---------------------------------------------------------------------------

/// A sign-in-with-Ethereum style message.
///
/// Rendering is deterministic: the same fields always produce the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub extension_id: String,
    pub address: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ext} wants you to sign in with your Ethereum account:\n\
             {address}\n\
             \n\
             By signing, you are proving you own this wallet and logging in. \
             This does not initiate a transaction or cost any fees.\n\
             \n\
             URI: chrome-extension://{ext}\n\
             Version: 1\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}",
            ext = self.extension_id,
            address = self.address,
            chain_id = self.chain_id,
            nonce = self.nonce,
            issued_at = format_timestamp(self.issued_at),
        )
    }
}

/// A message together with its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub message: String,
    pub signature: String,
}

impl SignedMessage {
    /// The auth-frame payload for this message, attributed to `identity`.
    pub fn into_auth_data(self, identity: &Identity) -> AuthData {
        AuthData {
            user_id: Some(identity.address().to_owned()),
            message: self.message,
            signature: self.signature,
        }
    }
}

/// Fetches a nonce, builds the message for `chain_id` and signs it.
pub async fn sign_in<A: AccountApi>(
    api: &A,
    signer: &dyn Signer,
    clock: &dyn Clock,
    extension_id: &str,
    chain_id: u64,
) -> Result<SignedMessage, SessionError> {
    let identity = signer.identity();
    let nonce = api.nonce(identity).await?;
    let message = SiweMessage {
        extension_id: extension_id.to_owned(),
        address: identity.address().to_owned(),
        chain_id,
        nonce,
        issued_at: clock.now(),
    }
    .to_string();
    let signature = signer.sign_message(&message)?;
    Ok(SignedMessage { message, signature })
}

/// Runs the HTTP login flow and returns a fresh bearer token.
pub async fn login<A: AccountApi>(
    api: &A,
    signer: &dyn Signer,
    clock: &dyn Clock,
    extension_id: &str,
) -> Result<String, SessionError> {
    let signed = sign_in(api, signer, clock, extension_id, LOGIN_CHAIN_ID).await?;
    let token = api.login(&signed).await?;
    tracing::debug!(identity = %signer.identity(), "logged in");
    Ok(token)
}
