//! Twitch Helix platform client (spec.md §4.B) — list top live channels,
//! create a clip, and fetch clip metadata, with single-refresh-then-retry
//! handling of an expired access token.

mod client;
mod error_classify;

pub use client::{ClipMetadata, TwitchPlatformClient};

use async_trait::async_trait;
use clipwatch_core::{LiveRanking, Result};

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Top `n` live channels ranked 1..=n, as returned by a single poll.
    async fn list_top_live(&self, n: u32) -> Result<LiveRanking>;

    /// Create a clip for `channel_id`. Returns the new clip's id.
    async fn create_clip(&self, channel_id: u64) -> Result<String>;

    /// Fetch embed/thumbnail metadata for a previously created clip.
    /// `Ok(None)` means the platform hasn't indexed the clip yet.
    async fn get_clip(&self, clip_id: &str) -> Result<Option<ClipMetadata>>;
}
