use std::sync::Arc;
use std::time::Duration;

use clipwatch_clipper::{ClipCreator, ClipOutcome};
use clipwatch_core::ClipwatchMetrics;
use clipwatch_eventbus::ChatConsumer;
use clipwatch_spike::SpikeDetector;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Consumes `chat-messages`, runs every line through the spike detector, and
/// spawns a bounded clip-creation task per anomaly so a slow clip doesn't
/// stall chat consumption (spec.md §4.D/§4.E boundary).
pub struct DetectorEngine {
    consumer: Box<dyn ChatConsumer>,
    detector: SpikeDetector,
    creator: Arc<ClipCreator>,
    metrics: Arc<ClipwatchMetrics>,
}

impl DetectorEngine {
    pub fn new(
        consumer: Box<dyn ChatConsumer>,
        detector: SpikeDetector,
        creator: Arc<ClipCreator>,
        metrics: Arc<ClipwatchMetrics>,
    ) -> Self {
        Self {
            consumer,
            detector,
            creator,
            metrics,
        }
    }

    /// Polls on `poll_interval`, draining every outstanding clip-creation task
    /// (with the same 10s budget the monitor gives its event-bus flush)
    /// before returning on shutdown.
    pub async fn run(&mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(poll_interval);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once(&mut in_flight, &shutdown).await;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("detector engine shutting down");
                        break;
                    }
                }
            }
        }

        match tokio::time::timeout(Duration::from_secs(10), async {
            while in_flight.join_next().await.is_some() {}
        })
        .await
        {
            Ok(()) => info!("all in-flight clip creations drained"),
            Err(_) => warn!("clip-creation drain deadline exceeded, some clips may be incomplete"),
        }
    }

    async fn poll_once(&mut self, in_flight: &mut JoinSet<()>, shutdown: &watch::Receiver<bool>) {
        let lines = match self.consumer.poll().await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "chat-messages poll failed");
                return;
            }
        };

        for line in &lines {
            self.metrics.chat_lines_total.with_label_values(&["consumed"]).inc();
            let Some(anomaly) = self.detector.process_line(line) else {
                continue;
            };

            self.metrics
                .anomalies_total
                .with_label_values(&[&anomaly.channel_id.to_string()])
                .inc();
            info!(channel_id = anomaly.channel_id, "anomaly detected, spawning clip creation");

            let creator = self.creator.clone();
            let metrics = self.metrics.clone();
            let mut shutdown = shutdown.clone();
            in_flight.spawn(async move {
                let outcome = creator.process(&anomaly, &mut shutdown).await;
                let label = match &outcome {
                    ClipOutcome::Persisted(_) => "persisted",
                    ClipOutcome::CreateFailedPermanent => "create_failed_permanent",
                    ClipOutcome::CreateFailedExhausted => "create_failed_exhausted",
                    ClipOutcome::MetaMissing => "meta_missing",
                    ClipOutcome::DbFailed => "db_failed",
                    ClipOutcome::ShutdownInterrupted => "shutdown_interrupted",
                };
                metrics.clips_created_total.with_label_values(&[label]).inc();
                if matches!(outcome, ClipOutcome::Persisted(_)) {
                    metrics.clips_persisted_total.with_label_values(&[]).inc();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipwatch_catalog::Catalog;
    use clipwatch_core::{ChatLine, ChatLineMetadata, ClipRecord, LiveRanking, Result};
    use clipwatch_platform::{ClipMetadata, PlatformClient};
    use clipwatch_spike::Clock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    struct FixedClock(AtomicI64);
    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FakeConsumer {
        queued: Mutex<VecDeque<ChatLine>>,
    }

    #[async_trait]
    impl ChatConsumer for FakeConsumer {
        async fn poll(&mut self) -> Result<Vec<ChatLine>> {
            Ok(self.queued.lock().unwrap().drain(..).collect())
        }
    }

    struct FakePlatform;
    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn list_top_live(&self, _n: u32) -> Result<LiveRanking> {
            Ok(LiveRanking::default())
        }
        async fn create_clip(&self, _channel_id: u64) -> Result<String> {
            Ok("C1".into())
        }
        async fn get_clip(&self, _clip_id: &str) -> Result<Option<ClipMetadata>> {
            Ok(Some(ClipMetadata {
                embed_url: "e".into(),
                thumbnail_url: "t".into(),
            }))
        }
    }

    struct RecordingCatalog {
        upserted: Mutex<Vec<ClipRecord>>,
    }
    #[async_trait]
    impl Catalog for RecordingCatalog {
        async fn upsert_clip(&self, clip: &ClipRecord) -> Result<()> {
            self.upserted.lock().unwrap().push(clip.clone());
            Ok(())
        }
        async fn upsert_streamer(&self, _channel_id: u64, _login: &str, _last_seen: chrono::DateTime<chrono::Utc>) -> Result<()> {
            Ok(())
        }
        async fn list_clips(
            &self,
            _start: chrono::DateTime<chrono::Utc>,
            _end: chrono::DateTime<chrono::Utc>,
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

    fn line(channel_id: u64, ts_ms: i64) -> ChatLine {
        ChatLine {
            channel_id,
            timestamp_ms: ts_ms,
            message_id: format!("m{ts_ms}"),
            text: "hello".into(),
            user_id: 1,
            user_name: "u".into(),
            metadata: ChatLineMetadata::default(),
        }
    }

    #[tokio::test]
    async fn anomaly_drives_a_clip_creation_that_gets_persisted() {
        let mut queued = VecDeque::new();
        for s in 0..300 {
            queued.push_back(line(111, s * 1000));
        }
        for _ in 0..25 {
            queued.push_back(line(111, 300_000));
        }

        let clock = Arc::new(FixedClock(AtomicI64::new(300_000)));
        let detector = SpikeDetector::new(clock);
        let platform: Arc<dyn PlatformClient> = Arc::new(FakePlatform);
        let catalog = Arc::new(RecordingCatalog {
            upserted: Mutex::new(Vec::new()),
        });
        let creator = Arc::new(ClipCreator::new(platform, catalog.clone(), vec![0], 0));
        let metrics = Arc::new(ClipwatchMetrics::new("clipwatch_detector_test"));

        let consumer = Box::new(FakeConsumer {
            queued: Mutex::new(queued),
        });
        let mut engine = DetectorEngine::new(consumer, detector, creator, metrics);

        let (_tx, rx) = watch::channel(false);
        let mut in_flight = JoinSet::new();
        engine.poll_once(&mut in_flight, &rx).await;
        while in_flight.join_next().await.is_some() {}

        assert_eq!(catalog.upserted.lock().unwrap().len(), 1);
    }
}
