use clipwatch_core::ClipwatchError;

const RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Classify a non-2xx Helix response per spec.md §7: the fixed retryable set
/// is `Transient`, everything else (including a post-refresh 401) is
/// `Permanent`.
pub fn classify_status(status: u16, body: &str) -> ClipwatchError {
    if RETRYABLE_STATUS_CODES.contains(&status) {
        ClipwatchError::Transient(format!("Twitch API returned {status}: {body}"))
    } else {
        ClipwatchError::Permanent(format!("Twitch API returned {status}: {body}"))
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}
