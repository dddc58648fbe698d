//! JSON-file [`TokenStore`].
//!
//! Layout: `{"0xAddress": {"auth_token": "...", "auth_message": "..."}}`.
//! Writes are serialized by a mutex and land atomically via a temp file and
//! a rename, so a crash mid-write leaves the previous contents intact. A file
//! that no longer parses is moved aside to `*.json.bak` before the next write
//! replaces it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sprout_session::{Identity, StoreError, TokenStore};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_message: Option<String>,
}

type Accounts = BTreeMap<String, StoredAccount>;

/// Credential cache persisted to one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unparseable store file is moved before being replaced.
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    async fn load(&self) -> Result<Accounts, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Accounts::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Accounts::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, accounts: &Accounts) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(accounts)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn read_field(
        &self,
        identity: &Identity,
        field: impl FnOnce(StoredAccount) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        let mut accounts = self.load().await?;
        Ok(accounts.remove(identity.address()).and_then(field))
    }

    async fn update(
        &self,
        identity: &Identity,
        apply: impl FnOnce(&mut StoredAccount),
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = match self.load().await {
            Ok(accounts) => accounts,
            Err(StoreError::Corrupt(reason)) => {
                let backup = self.backup_path();
                tokio::fs::rename(&self.path, &backup).await?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    %reason,
                    "token store unreadable, moved aside and starting fresh"
                );
                Accounts::new()
            }
            Err(err) => return Err(err),
        };
        apply(accounts.entry(identity.address().to_owned()).or_default());
        self.save(&accounts).await
    }
}

impl TokenStore for JsonFileStore {
    async fn token(&self, identity: &Identity) -> Result<Option<String>, StoreError> {
        self.read_field(identity, |a| a.auth_token).await
    }

    async fn put_token(&self, identity: &Identity, token: &str) -> Result<(), StoreError> {
        self.update(identity, |a| a.auth_token = Some(token.to_owned()))
            .await
    }

    async fn auth_message(&self, identity: &Identity) -> Result<Option<String>, StoreError> {
        self.read_field(identity, |a| a.auth_message).await
    }

    async fn put_auth_message(&self, identity: &Identity, message: &str) -> Result<(), StoreError> {
        self.update(identity, |a| a.auth_message = Some(message.to_owned()))
            .await
    }

    async fn forget_auth_message(&self, identity: &Identity) -> Result<(), StoreError> {
        self.update(identity, |a| a.auth_message = None).await
    }
}
