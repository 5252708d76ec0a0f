use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel as returned by a single top-live poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedChannel {
    pub channel_id: u64,
    /// Lowercase display handle.
    pub login: String,
    /// 1-based rank within the poll that produced this entry.
    pub rank: u32,
}

/// Ordered result of a single `list_top_live` call, up to `LEAVE_THRESHOLD` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRanking {
    pub channels: Vec<RankedChannel>,
}

impl LiveRanking {
    /// Logins ranked `1..=n` (inclusive), in rank order.
    pub fn top(&self, n: u32) -> impl Iterator<Item = &RankedChannel> {
        self.channels.iter().filter(move |c| c.rank <= n)
    }
}

/// Per-message moderation/subscription flags carried alongside a chat line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLineMetadata {
    #[serde(default)]
    pub emotes: HashMap<String, String>,
    #[serde(default)]
    pub badges: HashMap<String, String>,
    #[serde(default)]
    pub is_subscriber: bool,
    #[serde(default)]
    pub is_mod: bool,
}

/// A single chat message, synthesized by the fleet monitor at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub channel_id: u64,
    /// Milliseconds since epoch at ingest (wall clock, not platform-reported).
    pub timestamp_ms: i64,
    /// Freshly generated at ingest; unique per line.
    pub message_id: String,
    pub text: String,
    /// `0` when the platform didn't report a user id.
    pub user_id: u64,
    pub user_name: String,
    pub metadata: ChatLineMetadata,
}

/// `online`/`offline` transition for a monitored channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_type: LifecycleEventType,
    pub channel_id: u64,
    pub login: String,
    /// `0` for offline events.
    pub rank: u32,
    pub timestamp_s: i64,
}

/// Durable per-channel detector state. Keyed by `channel_id` by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerChannelDetectorState {
    /// `epoch_second -> message count`, sparse.
    pub bucket_counts: HashMap<i64, u32>,
    pub last_anomaly_ms: Option<i64>,
}

/// Emitted by the spike detector when a channel's chat volume jumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub channel_id: u64,
    pub detected_at_ms: i64,
    /// Sum of the detection window that triggered this anomaly.
    pub message_count: u64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
}

/// A persisted clip, primary-keyed by `clip_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub channel_id: u64,
    pub clip_id: String,
    pub embed_url: String,
    pub thumbnail_url: String,
    pub detected_at: DateTime<Utc>,
}

/// OAuth credential for the user-scoped Twitch token. Owned exclusively by
/// the credential store; other components hold short-lived copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub scopes: Vec<String>,
    pub updated_at: DateTime<Utc>,
}
