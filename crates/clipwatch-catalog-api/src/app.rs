use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clipwatch_catalog::Catalog;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::http::{clips, health};

/// Shared state handed to every handler.
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/v1.0/clip", get(clips::list_clips_handler))
        .route("/v1.0/clip/:clip_id", get(clips::get_clip_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
