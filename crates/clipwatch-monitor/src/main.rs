use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clipwatch_cache::MokaOnlineCache;
use clipwatch_catalog::PgCatalog;
use clipwatch_core::{ClipwatchConfig, ClipwatchMetrics};
use clipwatch_credentials::{CredentialStore, FileCredentialStore};
use clipwatch_eventbus::KafkaEventBus;
use clipwatch_monitor::{ChatConnector, FleetMonitor, IrcChatTransport};
use clipwatch_platform::TwitchPlatformClient;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

struct IrcConnector {
    nick: String,
    token_source: Arc<dyn CredentialStore>,
    tx: mpsc::Sender<clipwatch_monitor::RawChatLine>,
}

#[async_trait::async_trait]
impl ChatConnector for IrcConnector {
    async fn connect(&self) -> clipwatch_core::Result<Arc<dyn clipwatch_monitor::ChatTransport>> {
        let credential = self.token_source.load().await?;
        let transport = IrcChatTransport::connect(&self.nick, &credential.access_token, self.tx.clone()).await?;
        Ok(Arc::new(transport))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipwatch_monitor=info".into()),
        )
        .init();

    let config_path = std::env::var("CLIPWATCH_CONFIG").ok();
    let config = ClipwatchConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ClipwatchConfig::default()
    });

    let metrics = Arc::new(ClipwatchMetrics::new("clipwatch_monitor"));
    let metrics_for_server = metrics.clone();
    let metrics_addr: SocketAddr = format!("0.0.0.0:{}", config.monitor.health_port).parse()?;
    tokio::spawn(async move {
        if let Err(e) = clipwatch_core::metrics::serve_metrics(metrics_for_server, metrics_addr).await {
            warn!(error = %e, "metrics server exited");
        }
    });

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(config.credentials.token_file.clone()));

    let platform = Arc::new(
        TwitchPlatformClient::new(
            credentials.clone(),
            config.platform.client_id.clone(),
            config.platform.client_secret.clone(),
            config.platform.api_base.clone(),
            config.platform.auth_base.clone(),
            Duration::from_secs(config.platform.http_timeout_secs),
        )
        .await?,
    );

    let cache = Arc::new(MokaOnlineCache::new(Duration::from_secs(config.cache.streamer_ttl_secs)));

    let catalog = Arc::new(
        PgCatalog::connect(&config.catalog.dsn, config.catalog.pool_min, config.catalog.pool_max).await?,
    );

    let bus = Arc::new(KafkaEventBus::connect(&config.event_bus.bootstrap_servers)?);

    let (chat_tx, chat_rx) = mpsc::channel(1024);
    let connector = Arc::new(IrcConnector {
        nick: "clipwatch".to_string(),
        token_source: credentials,
        tx: chat_tx,
    });

    let mut monitor = FleetMonitor::new(
        platform,
        cache,
        catalog,
        bus,
        connector,
        metrics,
        config.monitor.join_threshold,
        config.monitor.leave_threshold,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(
        poll_interval_secs = config.monitor.poll_interval_secs,
        join_threshold = config.monitor.join_threshold,
        leave_threshold = config.monitor.leave_threshold,
        "fleet monitor starting"
    );

    monitor
        .run(Duration::from_secs(config.monitor.poll_interval_secs), chat_rx, shutdown_rx)
        .await;

    Ok(())
}
