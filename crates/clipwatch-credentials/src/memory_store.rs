use async_trait::async_trait;
use clipwatch_core::{ClipwatchError, Credential, Result};
use tokio::sync::RwLock;

use crate::CredentialStore;

/// In-process credential store for tests and for components that don't need
/// on-disk persistence (e.g. a test double platform client).
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Credential) -> Self {
        Self {
            inner: RwLock::new(Some(initial)),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Credential> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| ClipwatchError::CredentialMissing("no credential seeded".into()))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.inner.write().await = Some(credential.clone());
        Ok(())
    }
}
