//! Key Store: provider → credential + selected model.
//!
//! The orchestrator only reads through [`KeyStore`]; writes happen from the
//! settings endpoints.

use std::path::PathBuf;

use anyhow::Context;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{Credential, Provider};
use crate::storage;

pub mod handlers;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("API key cannot be empty")]
    EmptyKey,

    #[error("model '{model}' is not supported by {provider}")]
    UnsupportedModel { provider: Provider, model: String },

    #[error("key storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Read-only view of stored credentials.
pub trait KeyStore: Send + Sync {
    /// All stored credentials, ordered openai, anthropic, google.
    fn all_credentials(&self) -> Vec<Credential>;

    fn credential_for(&self, provider: Provider) -> Option<Credential> {
        self.all_credentials()
            .into_iter()
            .find(|c| c.provider == provider)
    }
}

/// Credentials kept in memory and, unless ephemeral, mirrored to a JSON file.
pub struct LocalKeyStore {
    path: Option<PathBuf>,
    keys: RwLock<Vec<Credential>>,
    write_lock: Mutex<()>,
}

impl LocalKeyStore {
    /// Loads `path` if it exists; starts empty otherwise.
    pub async fn open(path: PathBuf) -> anyhow::Result<Self> {
        let keys: Vec<Credential> = storage::read_json(&path).await?.unwrap_or_default();
        info!(count = keys.len(), "Loaded stored API keys");
        Ok(Self {
            path: Some(path),
            keys: RwLock::new(keys),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            keys: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Stores (or replaces) the key for `provider`. A missing model falls
    /// back to the provider default.
    pub async fn save(
        &self,
        provider: Provider,
        key: &str,
        model: Option<&str>,
    ) -> Result<Credential, KeyStoreError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(KeyStoreError::EmptyKey);
        }
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if !provider.supports_model(m) => {
                return Err(KeyStoreError::UnsupportedModel {
                    provider,
                    model: m.to_string(),
                })
            }
            Some(m) => m.to_string(),
            None => provider.default_model().to_string(),
        };

        let credential = Credential {
            provider,
            key: key.to_string(),
            model,
        };

        let _guard = self.write_lock.lock().await;
        let mut next: Vec<Credential> = self
            .keys
            .read()
            .iter()
            .filter(|c| c.provider != provider)
            .cloned()
            .collect();
        next.push(credential.clone());
        self.persist(&next).await?;
        *self.keys.write() = next;

        info!(provider = %provider, model = %credential.model, "Stored API key");
        Ok(credential)
    }

    /// Removes the key for `provider`. Returns whether one was stored.
    pub async fn remove(&self, provider: Provider) -> Result<bool, KeyStoreError> {
        let _guard = self.write_lock.lock().await;
        let next: Vec<Credential> = {
            let keys = self.keys.read();
            if !keys.iter().any(|c| c.provider == provider) {
                return Ok(false);
            }
            keys.iter().filter(|c| c.provider != provider).cloned().collect()
        };
        self.persist(&next).await?;
        *self.keys.write() = next;
        info!(provider = %provider, "Removed API key");
        Ok(true)
    }

    /// Writes `keys` to disk. Callers hold `write_lock` and only swap the
    /// in-memory list after this succeeds. On unix the file is owner-only.
    async fn persist(&self, keys: &[Credential]) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        storage::write_json_atomic(path, &keys).await?;
        restrict_permissions(path).await
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &std::path::Path) -> anyhow::Result<()> {
    Ok(())
}

impl KeyStore for LocalKeyStore {
    fn all_credentials(&self) -> Vec<Credential> {
        let keys = self.keys.read();
        Provider::ALL
            .iter()
            .filter_map(|p| keys.iter().find(|c| c.provider == *p).cloned())
            .collect()
    }
}
