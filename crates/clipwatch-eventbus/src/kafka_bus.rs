use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipwatch_core::{ChatLine, ClipwatchError, LifecycleEvent, Result};
use kafka::consumer::{Consumer, FetchOffset, GroupOffsetStorage};
use kafka::producer::{Producer, Record, RequiredAcks};
use tracing::{debug, warn};

use crate::{channel_key, ChatConsumer, ChatMessageWire, EventProducer, LifecycleWire};
use crate::{CHAT_MESSAGES_TOPIC, STREAM_LIFECYCLE_TOPIC};

/// Kafka-backed producer. The underlying `kafka` client is synchronous, so
/// every `send` is bounced through `spawn_blocking` to keep the monitor's
/// async loop from stalling on a slow broker.
pub struct KafkaEventBus {
    producer: Arc<Mutex<Producer>>,
}

impl KafkaEventBus {
    pub fn connect(bootstrap_servers: &str) -> Result<Self> {
        let hosts = vec![bootstrap_servers.to_string()];
        let producer = Producer::from_hosts(hosts)
            .with_ack_timeout(Duration::from_secs(10))
            .with_required_acks(RequiredAcks::One)
            .create()
            .map_err(|e| ClipwatchError::Fatal(format!("cannot connect to event bus: {e}")))?;
        Ok(Self {
            producer: Arc::new(Mutex::new(producer)),
        })
    }
}

#[async_trait]
impl EventProducer for KafkaEventBus {
    async fn publish_chat_line(&self, line: &ChatLine) -> Result<()> {
        let wire = ChatMessageWire::from(line);
        let payload = serde_json::to_vec(&wire)
            .map_err(|e| ClipwatchError::Permanent(format!("chat line encode failed: {e}")))?;
        let key = channel_key(line.channel_id);

        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            let record = Record::from_key_value(CHAT_MESSAGES_TOPIC, key, payload);
            producer
                .lock()
                .expect("producer mutex poisoned")
                .send(&record)
                .map_err(|e| ClipwatchError::Transient(format!("chat-messages produce failed: {e}")))
        })
        .await
        .map_err(|e| ClipwatchError::Transient(format!("produce task panicked: {e}")))?
    }

    async fn publish_lifecycle(&self, event: &LifecycleEvent) -> Result<()> {
        let wire = LifecycleWire::from(event);
        let payload = serde_json::to_vec(&wire)
            .map_err(|e| ClipwatchError::Permanent(format!("lifecycle encode failed: {e}")))?;
        let key = channel_key(event.channel_id);

        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            let record = Record::from_key_value(STREAM_LIFECYCLE_TOPIC, key, payload);
            producer.lock().expect("producer mutex poisoned").send(&record).map_err(|e| {
                ClipwatchError::Transient(format!("stream-lifecycle produce failed: {e}"))
            })
        })
        .await
        .map_err(|e| ClipwatchError::Transient(format!("produce task panicked: {e}")))?
    }

    async fn flush(&self) -> Result<()> {
        debug!("flushing event bus producer");
        // The `kafka` crate's `Producer::send` is itself synchronous and
        // acknowledges before returning, so there is no separate buffer to
        // drain here; this exists for API symmetry with the shutdown
        // sequence's flush-with-deadline step.
        Ok(())
    }
}

/// Kafka-backed consumer over `chat-messages`, used by the detector binary.
/// `Consumer::poll`/`commit_consumed` are synchronous too, so `poll` runs the
/// whole fetch-decode-commit cycle inside `spawn_blocking`.
pub struct KafkaChatConsumer {
    consumer: Arc<Mutex<Consumer>>,
}

impl KafkaChatConsumer {
    pub fn connect(bootstrap_servers: &str, group: &str) -> Result<Self> {
        let hosts = vec![bootstrap_servers.to_string()];
        let consumer = Consumer::from_hosts(hosts)
            .with_topic(CHAT_MESSAGES_TOPIC.to_string())
            .with_group(group.to_string())
            .with_fallback_offset(FetchOffset::Latest)
            .with_offset_storage(Some(GroupOffsetStorage::Kafka))
            .create()
            .map_err(|e| ClipwatchError::Fatal(format!("cannot connect to event bus: {e}")))?;
        Ok(Self {
            consumer: Arc::new(Mutex::new(consumer)),
        })
    }
}

#[async_trait]
impl ChatConsumer for KafkaChatConsumer {
    async fn poll(&mut self) -> Result<Vec<ChatLine>> {
        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || {
            let mut consumer = consumer.lock().expect("consumer mutex poisoned");
            let message_sets = consumer
                .poll()
                .map_err(|e| ClipwatchError::Transient(format!("chat-messages poll failed: {e}")))?;

            let mut lines = Vec::new();
            for ms in message_sets.iter() {
                for m in ms.messages() {
                    match serde_json::from_slice::<ChatMessageWire>(m.value) {
                        Ok(wire) => lines.push(ChatLine::from(wire)),
                        Err(e) => warn!(error = %e, "dropping malformed chat-messages record"),
                    }
                }
                consumer
                    .consume_messageset(ms)
                    .map_err(|e| ClipwatchError::Transient(format!("offset commit failed: {e}")))?;
            }
            consumer
                .commit_consumed()
                .map_err(|e| ClipwatchError::Transient(format!("offset commit failed: {e}")))?;

            Ok(lines)
        })
        .await
        .map_err(|e| ClipwatchError::Transient(format!("poll task panicked: {e}")))?
    }
}
