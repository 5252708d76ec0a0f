//! Twitch user-token persistence (spec.md §4.A CredentialStore).
//!
//! Loads and saves the single user-scoped OAuth credential used by the
//! platform client and the seed CLI. The on-disk shape mirrors the original
//! `twitch_user_tokens.json`: `access_token`, `refresh_token`, `scopes`,
//! `updated_at`.

mod file_store;
mod memory_store;

pub use file_store::FileCredentialStore;
pub use memory_store::MemoryCredentialStore;

use async_trait::async_trait;
use clipwatch_core::{ClipwatchError, Credential, Result};

/// Persists and retrieves the single user-scoped Twitch credential.
///
/// Implementations must make `save` atomic: a crash mid-write must never
/// leave behind a file `load` can't parse.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Credential>;
    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// The credential file does not exist — there is no way to run without a
/// seeded credential.
pub(crate) fn missing(path: &str) -> ClipwatchError {
    ClipwatchError::CredentialMissing(format!(
        "credential file {path} does not exist. Run the seed tool first."
    ))
}

/// The credential file exists but failed to parse, or a required token field
/// is empty.
pub(crate) fn corrupt(path: &str, err: impl std::fmt::Display) -> ClipwatchError {
    ClipwatchError::CredentialCorrupt(format!("credential file {path} is invalid: {err}"))
}
