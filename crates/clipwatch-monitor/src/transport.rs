use async_trait::async_trait;
use clipwatch_core::{ChatLineMetadata, Result};

/// One line received from the chat client, before it's been resolved to a
/// `channel_id` (spec.md §4.C chat pump — `room_name` is a login, not an id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChatLine {
    pub room_login: String,
    pub text: String,
    pub user_id: u64,
    pub user_name: String,
    pub metadata: ChatLineMetadata,
}

/// Chat-room membership control. Lazily connected on the first join
/// (spec.md §4.C: "lazy-initialize `chat` on first non-empty `to_join`").
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn join(&self, login: &str) -> Result<()>;
    async fn leave(&self, login: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}
