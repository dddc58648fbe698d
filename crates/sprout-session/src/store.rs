//! Per-identity credential cache.
//!
//! The store holds two entries per identity: the HTTP bearer token and the
//! serialized auth-frame payload used to re-authenticate the streaming
//! channel without a fresh nonce. Both are optional; an error reading either
//! is treated by callers exactly like a missing entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::{Identity, StoreError};

/// Key-value storage for credentials, keyed by identity.
pub trait TokenStore: Send + Sync + 'static {
    fn token(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn put_token(
        &self,
        identity: &Identity,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn auth_message(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn put_auth_message(
        &self,
        identity: &Identity,
        message: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drops the cached auth payload so the next connect signs a new one.
    fn forget_auth_message(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Reads a value, logging and discarding any store error.
pub(crate) fn or_absent(
    identity: &Identity,
    what: &'static str,
    result: Result<Option<String>, StoreError>,
) -> Option<String> {
    result.unwrap_or_else(|err| {
        tracing::warn!(%identity, error = %err, "reading cached {what} failed, treating as absent");
        None
    })
}

/// Logs a failed write. Persisting is best effort.
pub(crate) fn log_write(identity: &Identity, what: &'static str, result: Result<(), StoreError>) {
    if let Err(err) = result {
        tracing::warn!(%identity, error = %err, "persisting {what} failed");
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    token: Option<String>,
    auth_message: Option<String>,
}

/// A [`TokenStore`] that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<Identity, Entry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, identity: &Identity, f: impl FnOnce(&mut Entry) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(entries.entry(identity.clone()).or_default())
    }
}

impl TokenStore for MemoryTokenStore {
    async fn token(&self, identity: &Identity) -> Result<Option<String>, StoreError> {
        Ok(self.with_entry(identity, |e| e.token.clone()))
    }

    async fn put_token(&self, identity: &Identity, token: &str) -> Result<(), StoreError> {
        self.with_entry(identity, |e| e.token = Some(token.to_owned()));
        Ok(())
    }

    async fn auth_message(&self, identity: &Identity) -> Result<Option<String>, StoreError> {
        Ok(self.with_entry(identity, |e| e.auth_message.clone()))
    }

    async fn put_auth_message(&self, identity: &Identity, message: &str) -> Result<(), StoreError> {
        self.with_entry(identity, |e| e.auth_message = Some(message.to_owned()));
        Ok(())
    }

    async fn forget_auth_message(&self, identity: &Identity) -> Result<(), StoreError> {
        self.with_entry(identity, |e| e.auth_message = None);
        Ok(())
    }
}
