use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use clipwatch_catalog::ClipListing;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::app::AppState;

const DEFAULT_CLIP_LIMIT: i64 = 50;
const MAX_CLIP_LIMIT: i64 = 100;
const DEFAULT_DAYS_BACK: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct ListClipsQuery {
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
    broadcaster_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ClipDto {
    id: i64,
    broadcaster_id: i64,
    clip_id: String,
    embed_url: String,
    thumbnail_url: String,
    detected_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    streamer_login: Option<String>,
}

impl From<ClipListing> for ClipDto {
    fn from(c: ClipListing) -> Self {
        Self {
            id: c.id,
            broadcaster_id: c.broadcaster_id,
            clip_id: c.clip_id,
            embed_url: c.embed_url,
            thumbnail_url: c.thumbnail_url,
            detected_at: c.detected_at,
            created_at: c.created_at,
            streamer_login: c.streamer_login,
        }
    }
}

fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

fn bad_request(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

/// GET /v1.0/clip?start=&end=&limit=&broadcaster_id=
pub async fn list_clips_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListClipsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = match params.limit {
        Some(l) => l.clamp(1, MAX_CLIP_LIMIT),
        None => DEFAULT_CLIP_LIMIT,
    };

    let now = Utc::now();
    let default_start = now - Duration::days(DEFAULT_DAYS_BACK);

    let start = match &params.start {
        Some(s) => parse_iso8601(s).ok_or_else(|| bad_request("invalid start timestamp format, use ISO 8601"))?,
        None => default_start,
    };
    let end = match &params.end {
        Some(s) => parse_iso8601(s).ok_or_else(|| bad_request("invalid end timestamp format, use ISO 8601"))?,
        None => now,
    };

    if start > end {
        return Err(bad_request("start time must be before end time"));
    }

    let clips = state
        .catalog
        .list_clips(start, end, limit, params.broadcaster_id)
        .await
        .map_err(|e| {
            error!(error = %e, "clip listing query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal server error" })),
            )
        })?;

    let count = clips.len();
    let dtos: Vec<ClipDto> = clips.into_iter().map(ClipDto::from).collect();

    Ok(Json(json!({
        "clips": dtos,
        "count": count,
        "query": { "start": start, "end": end, "limit": limit, "broadcaster_id": params.broadcaster_id },
    })))
}

/// GET /v1.0/clip/:clip_id
pub async fn get_clip_handler(
    State(state): State<Arc<AppState>>,
    Path(clip_id): Path<String>,
) -> Result<Json<ClipDto>, (StatusCode, Json<Value>)> {
    let clip = state.catalog.get_clip_by_id(&clip_id).await.map_err(|e| {
        error!(error = %e, "clip lookup query failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal server error" })),
        )
    })?;

    match clip {
        Some(c) => Ok(Json(ClipDto::from(c))),
        None => Err((StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))),
    }
}
