use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clipwatch_cache::{streamer_key, OnlineCache};
use clipwatch_catalog::Catalog;
use clipwatch_core::{ChatLine, ClipwatchMetrics, LifecycleEvent, LifecycleEventType, Result};
use clipwatch_eventbus::EventProducer;
use clipwatch_platform::PlatformClient;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use crate::transport::{ChatTransport, RawChatLine};

/// Connects a fresh chat transport on demand. Implementations are expected
/// to be cheap to clone/hold — `FleetMonitor` calls `connect` at most once
/// per run, the first time a join is needed.
#[async_trait::async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChatTransport>>;
}

/// Single-writer fleet-monitor state (spec.md §4.C). All mutation happens in
/// `poll_once`/`handle_chat_line`, both driven from the same task.
pub struct FleetMonitor {
    platform: Arc<dyn PlatformClient>,
    cache: Arc<dyn OnlineCache>,
    catalog: Arc<dyn Catalog>,
    bus: Arc<dyn EventProducer>,
    connector: Arc<dyn ChatConnector>,
    metrics: Arc<ClipwatchMetrics>,
    join_threshold: u32,
    leave_threshold: u32,

    joined_channels: HashSet<String>,
    login_to_id: HashMap<String, u64>,
    chat: Mutex<Option<Arc<dyn ChatTransport>>>,
}

impl FleetMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        cache: Arc<dyn OnlineCache>,
        catalog: Arc<dyn Catalog>,
        bus: Arc<dyn EventProducer>,
        connector: Arc<dyn ChatConnector>,
        metrics: Arc<ClipwatchMetrics>,
        join_threshold: u32,
        leave_threshold: u32,
    ) -> Self {
        Self {
            platform,
            cache,
            catalog,
            bus,
            connector,
            metrics,
            join_threshold,
            leave_threshold,
            joined_channels: HashSet::new(),
            login_to_id: HashMap::new(),
            chat: Mutex::new(None),
        }
    }

    async fn ensure_chat(&self) -> Result<Arc<dyn ChatTransport>> {
        let mut guard = self.chat.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        let transport = self.connector.connect().await?;
        *guard = Some(transport.clone());
        Ok(transport)
    }

    /// One full poll/converge cycle (spec.md §4.C). Poll errors are logged
    /// and leave `joined_channels` untouched — the set only shrinks on a
    /// successful poll that proves a channel has dropped out of the top N.
    pub async fn poll_once(&mut self) {
        let ranking = match self.platform.list_top_live(self.leave_threshold).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "list_top_live failed, keeping current membership");
                self.metrics.polls_total.with_label_values(&["error"]).inc();
                return;
            }
        };
        self.metrics.polls_total.with_label_values(&["ok"]).inc();

        let top_join: HashSet<String> = ranking
            .top(self.join_threshold)
            .map(|c| c.login.clone())
            .collect();
        let top_leave: HashSet<String> = ranking
            .top(self.leave_threshold)
            .map(|c| c.login.clone())
            .collect();

        for channel in &ranking.channels {
            self.login_to_id.insert(channel.login.clone(), channel.channel_id);

            let key = streamer_key(&channel.login);
            let is_new = self
                .cache
                .set_if_absent(&key, channel.channel_id)
                .await
                .unwrap_or(true);

            if let Err(e) = self
                .catalog
                .upsert_streamer(channel.channel_id, &channel.login, Utc::now())
                .await
            {
                warn!(login = %channel.login, error = %e, "streamer catalog upsert failed");
            }

            if is_new && top_join.contains(&channel.login) {
                self.emit_lifecycle(LifecycleEventType::Online, channel.channel_id, &channel.login, channel.rank)
                    .await;
            }
        }

        let to_join: Vec<String> = top_join.difference(&self.joined_channels).cloned().collect();
        let to_leave: Vec<String> = self
            .joined_channels
            .difference(&top_leave)
            .cloned()
            .collect();

        if !to_join.is_empty() {
            match self.ensure_chat().await {
                Ok(chat) => {
                    for login in &to_join {
                        if let Err(e) = chat.join(login).await {
                            warn!(login, error = %e, "chat join failed");
                            continue;
                        }
                        self.joined_channels.insert(login.clone());
                        info!(login, "joined chat");
                    }
                }
                Err(e) => warn!(error = %e, "chat transport unavailable, skipping joins this cycle"),
            }
        }

        if !to_leave.is_empty() {
            if let Some(chat) = self.chat.lock().await.clone() {
                for login in &to_leave {
                    if let Err(e) = chat.leave(login).await {
                        warn!(login, error = %e, "chat leave failed");
                        continue;
                    }
                    self.joined_channels.remove(login);

                    let key = streamer_key(login);
                    let expired = !self.cache.contains(&key).await.unwrap_or(false);
                    if expired {
                        let channel_id = self.login_to_id.get(login).copied().unwrap_or(0);
                        self.emit_lifecycle(LifecycleEventType::Offline, channel_id, login, 0)
                            .await;
                    }
                }
            }
        }
    }

    async fn emit_lifecycle(&self, event_type: LifecycleEventType, channel_id: u64, login: &str, rank: u32) {
        let event = LifecycleEvent {
            event_type,
            channel_id,
            login: login.to_string(),
            rank,
            timestamp_s: Utc::now().timestamp(),
        };
        let label = match event_type {
            LifecycleEventType::Online => "online",
            LifecycleEventType::Offline => "offline",
        };
        if let Err(e) = self.bus.publish_lifecycle(&event).await {
            warn!(login, error = %e, "lifecycle publish failed");
        } else {
            self.metrics.lifecycle_events_total.with_label_values(&[label]).inc();
        }
        info!(login, channel_id, ?event_type, "lifecycle event");
    }

    /// Synthesizes a `ChatLine` from a raw transport line and publishes it.
    /// Unknown rooms are silently dropped (spec.md §4.C).
    pub async fn handle_chat_line(&self, raw: RawChatLine) {
        let Some(&channel_id) = self.login_to_id.get(&raw.room_login) else {
            return;
        };

        let line = ChatLine {
            channel_id,
            timestamp_ms: Utc::now().timestamp_millis(),
            message_id: uuid::Uuid::new_v4().to_string(),
            text: raw.text,
            user_id: raw.user_id,
            user_name: raw.user_name,
            metadata: raw.metadata,
        };

        match self.bus.publish_chat_line(&line).await {
            Ok(()) => self.metrics.chat_lines_total.with_label_values(&["ok"]).inc(),
            Err(e) => {
                warn!(channel_id, error = %e, "chat line publish failed");
                self.metrics.chat_lines_total.with_label_values(&["error"]).inc();
            }
        }
    }

    /// Runs the poll/chat-intake loop until `shutdown` fires, then closes
    /// the chat session and flushes the bus with a bounded deadline.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        mut chat_rx: mpsc::Receiver<RawChatLine>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                }
                Some(raw) = chat_rx.recv() => {
                    self.handle_chat_line(raw).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("fleet monitor shutting down");
                        break;
                    }
                }
            }
        }

        if let Some(chat) = self.chat.lock().await.take() {
            if let Err(e) = chat.close().await {
                warn!(error = %e, "error closing chat transport on shutdown");
            }
        }

        match tokio::time::timeout(Duration::from_secs(10), self.bus.flush()).await {
            Ok(Ok(())) => info!("event bus flushed"),
            Ok(Err(e)) => warn!(error = %e, "event bus flush failed"),
            Err(_) => warn!("event bus flush deadline exceeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipwatch_cache::MokaOnlineCache;
    use clipwatch_core::{ChatLineMetadata, ClipRecord, LiveRanking, RankedChannel};
    use clipwatch_eventbus::MemoryEventBus;
    use clipwatch_platform::ClipMetadata;
    use std::sync::Mutex as StdMutex;

    struct FakePlatform {
        rankings: StdMutex<Vec<LiveRanking>>,
    }

    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn list_top_live(&self, _n: u32) -> Result<LiveRanking> {
            let mut rankings = self.rankings.lock().unwrap();
            if rankings.len() > 1 {
                Ok(rankings.remove(0))
            } else {
                Ok(rankings[0].clone())
            }
        }
        async fn create_clip(&self, _channel_id: u64) -> Result<String> {
            Ok(String::new())
        }
        async fn get_clip(&self, _clip_id: &str) -> Result<Option<ClipMetadata>> {
            Ok(None)
        }
    }

    struct NoopCatalog;
    #[async_trait]
    impl Catalog for NoopCatalog {
        async fn upsert_clip(&self, _clip: &ClipRecord) -> Result<()> {
            Ok(())
        }
        async fn upsert_streamer(&self, _channel_id: u64, _login: &str, _last_seen: chrono::DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        async fn list_clips(
            &self,
            _start: chrono::DateTime<Utc>,
            _end: chrono::DateTime<Utc>,
            _limit: i64,
            _broadcaster_id: Option<i64>,
        ) -> Result<Vec<clipwatch_catalog::ClipListing>> {
            Ok(Vec::new())
        }
        async fn get_clip_by_id(&self, _clip_id: &str) -> Result<Option<clipwatch_catalog::ClipListing>> {
            Ok(None)
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeChat;
    #[async_trait]
    impl ChatTransport for FakeChat {
        async fn join(&self, _login: &str) -> Result<()> {
            Ok(())
        }
        async fn leave(&self, _login: &str) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeConnector;
    #[async_trait]
    impl ChatConnector for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn ChatTransport>> {
            Ok(Arc::new(FakeChat))
        }
    }

    fn ranking(logins: &[&str]) -> LiveRanking {
        LiveRanking {
            channels: logins
                .iter()
                .enumerate()
                .map(|(i, login)| RankedChannel {
                    channel_id: (i + 1) as u64,
                    login: login.to_string(),
                    rank: (i + 1) as u32,
                })
                .collect(),
        }
    }

    fn make_monitor(rankings: Vec<LiveRanking>) -> (FleetMonitor, Arc<MemoryEventBus>) {
        let platform = Arc::new(FakePlatform {
            rankings: StdMutex::new(rankings),
        });
        let cache = Arc::new(MokaOnlineCache::new(Duration::from_secs(180)));
        let catalog = Arc::new(NoopCatalog);
        let bus = Arc::new(MemoryEventBus::new());
        let connector = Arc::new(FakeConnector);
        let metrics = Arc::new(ClipwatchMetrics::new("clipwatch_monitor_test"));
        let monitor = FleetMonitor::new(platform, cache, catalog, bus.clone(), connector, metrics, 2, 4);
        (monitor, bus)
    }

    #[tokio::test]
    async fn first_poll_joins_top_join_threshold_channels() {
        let (mut monitor, bus) = make_monitor(vec![ranking(&["a", "b", "c", "d"])]);
        monitor.poll_once().await;

        assert_eq!(monitor.joined_channels.len(), 2);
        assert!(monitor.joined_channels.contains("a"));
        assert!(monitor.joined_channels.contains("b"));
        assert_eq!(bus.drain_lifecycle().len(), 2);
    }

    #[tokio::test]
    async fn channel_dropping_below_leave_threshold_leaves_and_emits_offline() {
        let (mut monitor, bus) = make_monitor(vec![
            ranking(&["a", "b", "c", "d"]),
            ranking(&["c", "d", "e", "f"]),
        ]);
        monitor.poll_once().await;
        bus.drain_lifecycle();

        monitor.poll_once().await;

        assert!(!monitor.joined_channels.contains("a"));
        assert!(!monitor.joined_channels.contains("b"));
    }

    #[tokio::test]
    async fn channel_oscillating_within_leave_threshold_is_not_dropped() {
        let (mut monitor, bus) = make_monitor(vec![
            ranking(&["a", "b", "c", "d"]),
            ranking(&["b", "c", "d", "a"]),
        ]);
        monitor.poll_once().await;
        bus.drain_lifecycle();

        monitor.poll_once().await;

        assert!(monitor.joined_channels.contains("a"), "still ranked within leave_threshold, must stay joined");
    }

    #[tokio::test]
    async fn unknown_room_lines_are_silently_dropped() {
        let (monitor, bus) = make_monitor(vec![ranking(&["a"])]);
        monitor
            .handle_chat_line(RawChatLine {
                room_login: "unknown".into(),
                text: "hi".into(),
                user_id: 1,
                user_name: "u".into(),
                metadata: ChatLineMetadata::default(),
            })
            .await;
        assert!(bus.drain_lifecycle().is_empty());
    }

    #[tokio::test]
    async fn known_room_lines_publish_with_resolved_channel_id() {
        let (mut monitor, bus) = make_monitor(vec![ranking(&["a"])]);
        monitor.poll_once().await;

        monitor
            .handle_chat_line(RawChatLine {
                room_login: "a".into(),
                text: "hi".into(),
                user_id: 1,
                user_name: "u".into(),
                metadata: ChatLineMetadata::default(),
            })
            .await;

        let mut consumer = clipwatch_eventbus::MemoryChatConsumer::new(&*bus);
        let lines = clipwatch_eventbus::ChatConsumer::poll(&mut consumer).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].channel_id, 1);
    }
}
