use thiserror::Error;

/// Shared error taxonomy (spec §7): every operational error is one of these
/// four shapes. `Transient`/`Permanent` carry enough context for logs and
/// metrics; `Configuration`/`Fatal` are exit-1 conditions at startup.
#[derive(Debug, Error)]
pub enum ClipwatchError {
    /// Retryable I/O failure — the caller's retry policy decides what happens next.
    #[error("transient: {0}")]
    Transient(String),

    /// Non-retryable failure (4xx except 429, malformed payload, post-refresh 401).
    #[error("permanent: {0}")]
    Permanent(String),

    /// Missing credential, missing required env var — fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cannot connect to a required dependency on boot (catalog, event bus, cache).
    #[error("fatal: {0}")]
    Fatal(String),

    /// Credential file does not exist (spec §4.A `load()`).
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// Credential file exists but can't be parsed, or has an empty token field (spec §4.A `load()`).
    #[error("credential corrupt: {0}")]
    CredentialCorrupt(String),
}

impl ClipwatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClipwatchError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ClipwatchError>;
