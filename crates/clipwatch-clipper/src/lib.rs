//! Clip-creation state machine (spec.md §4.E):
//!
//! `RECEIVED → CREATING → (CREATED | CREATE_FAILED_PERMANENT | CREATE_FAILED_EXHAUSTED)
//!   → WAITING → FETCHING_META → (PERSISTED | META_MISSING | DB_FAILED)`

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clipwatch_catalog::Catalog;
use clipwatch_core::{AnomalyEvent, ClipRecord, Result};
use clipwatch_platform::PlatformClient;
use tokio::sync::watch;
use tracing::{info, warn};

/// Terminal outcome of processing one anomaly, named after the spec's state
/// machine so logs and metrics can report it directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    Persisted(ClipRecord),
    CreateFailedPermanent,
    CreateFailedExhausted,
    MetaMissing,
    DbFailed,
    ShutdownInterrupted,
}

pub struct ClipCreator {
    platform: Arc<dyn PlatformClient>,
    catalog: Arc<dyn Catalog>,
    retry_delays_secs: Vec<u64>,
    processing_delay_secs: u64,
}

impl ClipCreator {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        catalog: Arc<dyn Catalog>,
        retry_delays_secs: Vec<u64>,
        processing_delay_secs: u64,
    ) -> Self {
        Self {
            platform,
            catalog,
            retry_delays_secs,
            processing_delay_secs,
        }
    }

    /// Drive one anomaly through the full state machine. `shutdown` is
    /// checked before every sleep so a shutdown signal interrupts a pending
    /// retry or the processing-delay wait rather than blocking it.
    pub async fn process(
        &self,
        anomaly: &AnomalyEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ClipOutcome {
        let clip_id = match self.create_with_retry(anomaly.channel_id, shutdown).await {
            CreateResult::Id(id) => id,
            CreateResult::Permanent => return ClipOutcome::CreateFailedPermanent,
            CreateResult::Exhausted => return ClipOutcome::CreateFailedExhausted,
            CreateResult::Interrupted => return ClipOutcome::ShutdownInterrupted,
        };

        info!(channel_id = anomaly.channel_id, clip_id, "clip created, waiting for materialization");
        if !interruptible_sleep(Duration::from_secs(self.processing_delay_secs), shutdown).await {
            return ClipOutcome::ShutdownInterrupted;
        }

        let metadata = match self.platform.get_clip(&clip_id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                warn!(clip_id, "clip metadata never materialized");
                return ClipOutcome::MetaMissing;
            }
            Err(e) => {
                warn!(clip_id, error = %e, "get_clip failed");
                return ClipOutcome::MetaMissing;
            }
        };

        let detected_at = Utc
            .timestamp_millis_opt(anomaly.detected_at_ms)
            .single()
            .unwrap_or_else(Utc::now);

        let record = ClipRecord {
            channel_id: anomaly.channel_id,
            clip_id: clip_id.clone(),
            embed_url: metadata.embed_url,
            thumbnail_url: metadata.thumbnail_url,
            detected_at,
        };

        match self.catalog.upsert_clip(&record).await {
            Ok(()) => ClipOutcome::Persisted(record),
            Err(e) => {
                warn!(clip_id, error = %e, "catalog upsert failed");
                ClipOutcome::DbFailed
            }
        }
    }

    async fn create_with_retry(
        &self,
        channel_id: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CreateResult {
        for (attempt, delay_secs) in self.retry_delays_secs.iter().enumerate() {
            if *delay_secs > 0 && !interruptible_sleep(Duration::from_secs(*delay_secs), shutdown).await {
                return CreateResult::Interrupted;
            }

            match self.platform.create_clip(channel_id).await {
                Ok(clip_id) if !clip_id.is_empty() => return CreateResult::Id(clip_id),
                Ok(_) => continue,
                Err(e) if e.is_retryable() => {
                    warn!(channel_id, attempt, error = %e, "create_clip attempt failed, retrying");
                    continue;
                }
                Err(e) => {
                    warn!(channel_id, error = %e, "create_clip failed permanently");
                    return CreateResult::Permanent;
                }
            }
        }
        CreateResult::Exhausted
    }
}

enum CreateResult {
    Id(String),
    Permanent,
    Exhausted,
    Interrupted,
}

/// Sleeps for `duration` unless `shutdown` flips to `true` first.
/// Returns `false` when interrupted by shutdown.
async fn interruptible_sleep(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipwatch_core::{ClipwatchError, LiveRanking};
    use clipwatch_platform::ClipMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePlatform {
        create_responses: Mutex<Vec<Result<String>>>,
        get_clip_response: Mutex<Option<Option<ClipMetadata>>>,
        create_calls: AtomicUsize,
    }

    impl FakePlatform {
        fn new(create_responses: Vec<Result<String>>, get_clip_response: Option<ClipMetadata>) -> Self {
            Self {
                create_responses: Mutex::new(create_responses),
                get_clip_response: Mutex::new(Some(get_clip_response)),
                create_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn list_top_live(&self, _n: u32) -> Result<LiveRanking> {
            Ok(LiveRanking::default())
        }

        async fn create_clip(&self, _channel_id: u64) -> Result<String> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.create_responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(String::new());
            }
            responses.remove(0)
        }

        async fn get_clip(&self, _clip_id: &str) -> Result<Option<ClipMetadata>> {
            Ok(self.get_clip_response.lock().unwrap().clone().flatten())
        }
    }

    struct FakeCatalog {
        upserted: Mutex<Vec<ClipRecord>>,
        fail: bool,
    }

    impl FakeCatalog {
        fn new(fail: bool) -> Self {
            Self {
                upserted: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn upsert_clip(&self, clip: &ClipRecord) -> Result<()> {
            if self.fail {
                return Err(ClipwatchError::Transient("db down".into()));
            }
            self.upserted.lock().unwrap().push(clip.clone());
            Ok(())
        }

        async fn upsert_streamer(
            &self,
            _channel_id: u64,
            _login: &str,
            _last_seen: chrono::DateTime<Utc>,
        ) -> Result<()> {
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

    fn anomaly() -> AnomalyEvent {
        AnomalyEvent {
            channel_id: 111,
            detected_at_ms: 1_700_000_000_000,
            message_count: 25,
            baseline_mean: 5.0,
            baseline_std: 1.0,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_and_persists() {
        let platform = Arc::new(FakePlatform::new(
            vec![Ok("C1".to_string())],
            Some(ClipMetadata {
                embed_url: "e1".into(),
                thumbnail_url: "t1".into(),
            }),
        ));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform, catalog.clone(), vec![0, 3, 6], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        match outcome {
            ClipOutcome::Persisted(record) => {
                assert_eq!(record.clip_id, "C1");
                assert_eq!(record.embed_url, "e1");
            }
            other => panic!("expected Persisted, got {other:?}"),
        }
        assert_eq!(catalog.upserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_aborts_without_retry() {
        let platform = Arc::new(FakePlatform::new(
            vec![Err(ClipwatchError::Permanent("403".into()))],
            None,
        ));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform.clone(), catalog, vec![0, 3, 6], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        assert_eq!(outcome, ClipOutcome::CreateFailedPermanent);
        assert_eq!(platform.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let platform = Arc::new(FakePlatform::new(
            vec![
                Err(ClipwatchError::Transient("503".into())),
                Err(ClipwatchError::Transient("503".into())),
                Ok("C2".to_string()),
            ],
            Some(ClipMetadata {
                embed_url: "e2".into(),
                thumbnail_url: "t2".into(),
            }),
        ));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform.clone(), catalog, vec![0, 0, 0], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        assert!(matches!(outcome, ClipOutcome::Persisted(_)));
        assert_eq!(platform.create_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_on_repeated_transient_failure() {
        let platform = Arc::new(FakePlatform::new(
            vec![
                Err(ClipwatchError::Transient("503".into())),
                Err(ClipwatchError::Transient("503".into())),
                Err(ClipwatchError::Transient("503".into())),
            ],
            None,
        ));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform, catalog, vec![0, 0, 0], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        assert_eq!(outcome, ClipOutcome::CreateFailedExhausted);
    }

    #[tokio::test]
    async fn missing_metadata_ends_pipeline_without_db_write() {
        let platform = Arc::new(FakePlatform::new(vec![Ok("C3".to_string())], None));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform, catalog.clone(), vec![0], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        assert_eq!(outcome, ClipOutcome::MetaMissing);
        assert!(catalog.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn db_failure_is_reported_and_not_silently_dropped() {
        let platform = Arc::new(FakePlatform::new(
            vec![Ok("C4".to_string())],
            Some(ClipMetadata {
                embed_url: "e4".into(),
                thumbnail_url: "t4".into(),
            }),
        ));
        let catalog = Arc::new(FakeCatalog::new(true));
        let creator = ClipCreator::new(platform, catalog, vec![0], 0);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = creator.process(&anomaly(), &mut rx).await;
        assert_eq!(outcome, ClipOutcome::DbFailed);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_pending_retry_sleep() {
        let platform = Arc::new(FakePlatform::new(
            vec![
                Err(ClipwatchError::Transient("503".into())),
                Ok("C5".to_string()),
            ],
            Some(ClipMetadata {
                embed_url: "e5".into(),
                thumbnail_url: "t5".into(),
            }),
        ));
        let catalog = Arc::new(FakeCatalog::new(false));
        let creator = ClipCreator::new(platform, catalog, vec![0, 60, 60], 0);
        let (tx, mut rx) = watch::channel(false);

        let anomaly = anomaly();
        let handle = tokio::spawn(async move { creator.process(&anomaly, &mut rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, ClipOutcome::ShutdownInterrupted);
    }
}
