use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use clipwatch_core::{ChatLine, LifecycleEvent, Result};

use crate::{ChatConsumer, EventProducer};

/// In-process fake bus shared between a producer handle and a consumer
/// handle in tests — a `VecDeque` standing in for a single partition.
#[derive(Default)]
pub struct MemoryEventBus {
    chat: Mutex<VecDeque<ChatLine>>,
    lifecycle: Mutex<VecDeque<LifecycleEvent>>,
    flushed: Mutex<bool>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_lifecycle(&self) -> Vec<LifecycleEvent> {
        self.lifecycle.lock().unwrap().drain(..).collect()
    }

    pub fn was_flushed(&self) -> bool {
        *self.flushed.lock().unwrap()
    }
}

#[async_trait]
impl EventProducer for MemoryEventBus {
    async fn publish_chat_line(&self, line: &ChatLine) -> Result<()> {
        self.chat.lock().unwrap().push_back(line.clone());
        Ok(())
    }

    async fn publish_lifecycle(&self, event: &LifecycleEvent) -> Result<()> {
        self.lifecycle.lock().unwrap().push_back(event.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        *self.flushed.lock().unwrap() = true;
        Ok(())
    }
}

/// Pulls everything currently queued — analogous to one `poll()` cycle
/// against a real broker with nothing further in flight.
pub struct MemoryChatConsumer<'a> {
    bus: &'a MemoryEventBus,
}

impl<'a> MemoryChatConsumer<'a> {
    pub fn new(bus: &'a MemoryEventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ChatConsumer for MemoryChatConsumer<'_> {
    async fn poll(&mut self) -> Result<Vec<ChatLine>> {
        Ok(self.bus.chat.lock().unwrap().drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipwatch_core::ChatLineMetadata;

    fn line(channel_id: u64) -> ChatLine {
        ChatLine {
            channel_id,
            timestamp_ms: 0,
            message_id: "m".into(),
            text: "hi".into(),
            user_id: 1,
            user_name: "u".into(),
            metadata: ChatLineMetadata::default(),
        }
    }

    #[tokio::test]
    async fn published_chat_lines_are_polled_in_order() {
        let bus = MemoryEventBus::new();
        bus.publish_chat_line(&line(1)).await.unwrap();
        bus.publish_chat_line(&line(2)).await.unwrap();

        let mut consumer = MemoryChatConsumer::new(&bus);
        let polled = consumer.poll().await.unwrap();
        assert_eq!(polled.len(), 2);
        assert_eq!(polled[0].channel_id, 1);
        assert_eq!(polled[1].channel_id, 2);
    }

    #[tokio::test]
    async fn flush_is_observable() {
        let bus = MemoryEventBus::new();
        assert!(!bus.was_flushed());
        bus.flush().await.unwrap();
        assert!(bus.was_flushed());
    }
}
