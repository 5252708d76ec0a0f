//! Prometheus counters + the `/metrics`/`/health` axum server shared by both
//! the monitor and detector binaries.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;

/// Named counters every binary registers; each process picks which ones it
/// actually increments.
pub struct ClipwatchMetrics {
    pub registry: Registry,
    pub polls_total: IntCounterVec,
    pub chat_lines_total: IntCounterVec,
    pub lifecycle_events_total: IntCounterVec,
    pub anomalies_total: IntCounterVec,
    pub clips_created_total: IntCounterVec,
    pub clips_persisted_total: IntCounterVec,
}

impl ClipwatchMetrics {
    pub fn new(namespace: &str) -> Self {
        let registry = Registry::new();

        let polls_total = IntCounterVec::new(
            Opts::new("polls_total", "Top-live polls performed").namespace(namespace),
            &["result"],
        )
        .unwrap();
        let chat_lines_total = IntCounterVec::new(
            Opts::new("chat_lines_total", "Chat lines ingested").namespace(namespace),
            &["result"],
        )
        .unwrap();
        let lifecycle_events_total = IntCounterVec::new(
            Opts::new("lifecycle_events_total", "online/offline events emitted").namespace(namespace),
            &["event_type"],
        )
        .unwrap();
        let anomalies_total = IntCounterVec::new(
            Opts::new("anomalies_total", "Chat-spike anomalies detected").namespace(namespace),
            &["channel_id"],
        )
        .unwrap();
        let clips_created_total = IntCounterVec::new(
            Opts::new("clips_created_total", "Clip-creation attempts by outcome").namespace(namespace),
            &["outcome"],
        )
        .unwrap();
        let clips_persisted_total = IntCounterVec::new(
            Opts::new("clips_persisted_total", "Clips written to the catalog").namespace(namespace),
            &[],
        )
        .unwrap();

        for c in [
            Box::new(polls_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(chat_lines_total.clone()),
            Box::new(lifecycle_events_total.clone()),
            Box::new(anomalies_total.clone()),
            Box::new(clips_created_total.clone()),
            Box::new(clips_persisted_total.clone()),
        ] {
            registry.register(c).expect("duplicate metric registration");
        }

        Self {
            registry,
            polls_total,
            chat_lines_total,
            lifecycle_events_total,
            anomalies_total,
            clips_created_total,
            clips_persisted_total,
        }
    }
}

async fn metrics_handler(State(metrics): State<Arc<ClipwatchMetrics>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (StatusCode::OK, buf).into_response()
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Serves `/metrics` and `/health` until the process exits. Intended to be
/// spawned as its own task alongside a binary's main loop.
pub async fn serve_metrics(metrics: Arc<ClipwatchMetrics>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics);

    info!(%addr, "metrics/health server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
