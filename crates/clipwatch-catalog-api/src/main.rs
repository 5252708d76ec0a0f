use std::net::SocketAddr;
use std::sync::Arc;

use clipwatch_catalog::PgCatalog;
use clipwatch_core::ClipwatchConfig;
use tracing::{info, warn};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipwatch_catalog_api=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("CLIPWATCH_CONFIG").ok();
    let config = ClipwatchConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ClipwatchConfig::default()
    });

    let catalog = Arc::new(
        PgCatalog::connect(&config.catalog.dsn, config.catalog.pool_min, config.catalog.pool_max).await?,
    );

    let state = Arc::new(app::AppState { catalog });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.catalog_api.port).parse()?;
    info!(%addr, "clip catalog API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
