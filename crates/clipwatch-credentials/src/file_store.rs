use async_trait::async_trait;
use clipwatch_core::{Credential, Result};
use tracing::info;

use crate::{corrupt, missing, CredentialStore};

/// JSON-on-disk credential store, written atomically via a temp file + rename
/// so a crash mid-save can't corrupt the file a running process depends on.
pub struct FileCredentialStore {
    path: String,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Credential> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                missing(&self.path)
            } else {
                corrupt(&self.path, e)
            }
        })?;
        let credential: Credential =
            serde_json::from_str(&data).map_err(|e| corrupt(&self.path, e))?;

        if credential.access_token.is_empty() || credential.refresh_token.is_empty() {
            return Err(corrupt(&self.path, "access_token/refresh_token must not be empty"));
        }

        Ok(credential)
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| corrupt(&self.path, e))?;
            }
        }

        let json = serde_json::to_string_pretty(credential).map_err(|e| corrupt(&self.path, e))?;

        let tmp_path = format!("{}.tmp", self.path);
        std::fs::write(&tmp_path, json).map_err(|e| corrupt(&self.path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| corrupt(&self.path, e))?;

        info!(path = %self.path, "saved refreshed credential");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Credential {
        Credential {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            scopes: vec!["chat:read".into(), "clips:edit".into()],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(path.to_str().unwrap());

        let cred = sample();
        store.save(&cred).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, cred);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/secrets/tokens.json");
        let store = FileCredentialStore::new(path.to_str().unwrap());

        store.save(&sample()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_file_is_a_credential_missing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let store = FileCredentialStore::new(path.to_str().unwrap());

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, clipwatch_core::ClipwatchError::CredentialMissing(_)));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_credential_corrupt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileCredentialStore::new(path.to_str().unwrap());

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, clipwatch_core::ClipwatchError::CredentialCorrupt(_)));
    }

    #[tokio::test]
    async fn empty_token_field_is_a_credential_corrupt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let mut cred = sample();
        cred.access_token = String::new();
        std::fs::write(&path, serde_json::to_string(&cred).unwrap()).unwrap();
        let store = FileCredentialStore::new(path.to_str().unwrap());

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, clipwatch_core::ClipwatchError::CredentialCorrupt(_)));
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(path.to_str().unwrap());

        store.save(&sample()).await.unwrap();
        let mut second = sample();
        second.access_token = "at-2".into();
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.access_token, "at-2");
    }
}
