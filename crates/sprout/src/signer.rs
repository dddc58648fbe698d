//! Local-key [`Signer`] backed by alloy.

use std::fmt;
use std::str::FromStr;

use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use sprout_session::{Identity, SignError, Signer};

/// Signs with an in-memory secp256k1 key (EIP-191 personal-sign).
pub struct LocalSigner {
    key: PrivateKeySigner,
    identity: Identity,
}

impl LocalSigner {
    /// Parses a hex private key, with or without the `0x` prefix.
    pub fn from_hex(key: &str) -> Result<Self, SignError> {
        let key = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| SignError::InvalidKey(e.to_string()))?;
        let identity = Identity::new(key.address().to_checksum(None));
        Ok(Self { key, identity })
    }
}

impl Signer for LocalSigner {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn sign_message(&self, message: &str) -> Result<String, SignError> {
        let signature = self
            .key
            .sign_message_sync(message.as_bytes())
            .map_err(|e| SignError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
