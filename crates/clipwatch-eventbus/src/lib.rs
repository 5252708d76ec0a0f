//! Chat/lifecycle event bus (spec.md §6 EXTERNAL INTERFACES).
//!
//! Two logical topics: `chat-messages` (keyed by channel-id decimal bytes,
//! consumed by the spike detector) and `stream-lifecycle` (same keying,
//! currently produce-only — nothing in this workspace consumes it, matching
//! the original's best-effort lifecycle broadcast).

mod kafka_bus;
mod memory_bus;
mod wire;

pub use kafka_bus::KafkaEventBus;
pub use memory_bus::MemoryEventBus;
pub use wire::{ChatMessageWire, LifecycleWire};

use async_trait::async_trait;
use clipwatch_core::{ChatLine, LifecycleEvent, Result};

pub const CHAT_MESSAGES_TOPIC: &str = "chat-messages";
pub const STREAM_LIFECYCLE_TOPIC: &str = "stream-lifecycle";

/// Producer side of the bus. `flush` is called once, with a deadline, during
/// shutdown (spec.md §4.C: 10-second flush budget).
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn publish_chat_line(&self, line: &ChatLine) -> Result<()>;
    async fn publish_lifecycle(&self, event: &LifecycleEvent) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}

/// Consumer side of the bus, used by the detector to read `chat-messages`.
/// `poll` returns whatever is immediately available and never blocks longer
/// than the implementation's own internal fetch timeout.
#[async_trait]
pub trait ChatConsumer: Send + Sync {
    async fn poll(&mut self) -> Result<Vec<ChatLine>>;
}

pub(crate) fn channel_key(channel_id: u64) -> Vec<u8> {
    channel_id.to_string().into_bytes()
}
