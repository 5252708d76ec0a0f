use clipwatch_core::{ChatLine, ChatLineMetadata, LifecycleEvent, LifecycleEventType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// On-wire shape for topic `chat-messages` (spec.md §6). Field names follow
/// the wire contract, not this crate's own `ChatLine` naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageWire {
    pub broadcaster_id: u64,
    pub timestamp: i64,
    pub message_id: String,
    pub text: String,
    pub user_id: u64,
    pub user_name: String,
    pub metadata: ChatMetadataWire,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMetadataWire {
    #[serde(default)]
    pub emotes: HashMap<String, String>,
    #[serde(default)]
    pub badges: HashMap<String, String>,
    pub is_subscriber: bool,
    pub is_mod: bool,
}

impl From<&ChatLine> for ChatMessageWire {
    fn from(line: &ChatLine) -> Self {
        Self {
            broadcaster_id: line.channel_id,
            timestamp: line.timestamp_ms,
            message_id: line.message_id.clone(),
            text: line.text.clone(),
            user_id: line.user_id,
            user_name: line.user_name.clone(),
            metadata: ChatMetadataWire {
                emotes: line.metadata.emotes.clone(),
                badges: line.metadata.badges.clone(),
                is_subscriber: line.metadata.is_subscriber,
                is_mod: line.metadata.is_mod,
            },
        }
    }
}

impl From<ChatMessageWire> for ChatLine {
    fn from(wire: ChatMessageWire) -> Self {
        ChatLine {
            channel_id: wire.broadcaster_id,
            timestamp_ms: wire.timestamp,
            message_id: wire.message_id,
            text: wire.text,
            user_id: wire.user_id,
            user_name: wire.user_name,
            metadata: ChatLineMetadata {
                emotes: wire.metadata.emotes,
                badges: wire.metadata.badges,
                is_subscriber: wire.metadata.is_subscriber,
                is_mod: wire.metadata.is_mod,
            },
        }
    }
}

/// On-wire shape for topic `stream-lifecycle` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleWire {
    pub event_type: LifecycleEventType,
    pub broadcaster_id: u64,
    pub broadcaster_login: String,
    pub rank: u32,
    pub timestamp: i64,
}

impl From<&LifecycleEvent> for LifecycleWire {
    fn from(event: &LifecycleEvent) -> Self {
        Self {
            event_type: event.event_type,
            broadcaster_id: event.channel_id,
            broadcaster_login: event.login.clone(),
            rank: event.rank,
            timestamp: event.timestamp_s,
        }
    }
}
