use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clipwatch_catalog::PgCatalog;
use clipwatch_clipper::ClipCreator;
use clipwatch_core::{ClipwatchConfig, ClipwatchMetrics};
use clipwatch_credentials::{CredentialStore, FileCredentialStore};
use clipwatch_detector::DetectorEngine;
use clipwatch_eventbus::KafkaChatConsumer;
use clipwatch_platform::TwitchPlatformClient;
use clipwatch_spike::{SpikeDetector, WallClock};
use tokio::sync::watch;
use tracing::{info, warn};

const CONSUMER_GROUP: &str = "clipwatch-detector";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipwatch_detector=info".into()),
        )
        .init();

    let config_path = std::env::var("CLIPWATCH_CONFIG").ok();
    let config = ClipwatchConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ClipwatchConfig::default()
    });

    let metrics = Arc::new(ClipwatchMetrics::new("clipwatch_detector"));
    let metrics_for_server = metrics.clone();
    let metrics_addr: SocketAddr = format!("0.0.0.0:{}", config.metrics.port).parse()?;
    tokio::spawn(async move {
        if let Err(e) = clipwatch_core::metrics::serve_metrics(metrics_for_server, metrics_addr).await {
            warn!(error = %e, "metrics server exited");
        }
    });

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(config.credentials.token_file.clone()));

    let platform = Arc::new(
        TwitchPlatformClient::new(
            credentials,
            config.platform.client_id.clone(),
            config.platform.client_secret.clone(),
            config.platform.api_base.clone(),
            config.platform.auth_base.clone(),
            Duration::from_secs(config.platform.http_timeout_secs),
        )
        .await?,
    );

    let catalog = Arc::new(
        PgCatalog::connect(&config.catalog.dsn, config.catalog.pool_min, config.catalog.pool_max).await?,
    );

    let consumer = Box::new(KafkaChatConsumer::connect(&config.event_bus.bootstrap_servers, CONSUMER_GROUP)?);

    let detector = SpikeDetector::new(Arc::new(WallClock));
    let creator = Arc::new(ClipCreator::new(
        platform,
        catalog,
        config.clipper.retry_delays_secs.clone(),
        config.clipper.processing_delay_secs,
    ));

    let mut engine = DetectorEngine::new(consumer, detector, creator, metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(parallelism = config.detector.parallelism, "chat-spike detector starting");
    engine.run(Duration::from_millis(500), shutdown_rx).await;

    Ok(())
}
