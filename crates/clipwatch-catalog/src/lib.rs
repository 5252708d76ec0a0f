//! Clip/streamer catalog (spec.md §6 `clips`/`streamers` tables).
//!
//! Postgres via `sqlx`, pooled 2–10 connections per spec.md §5 shared-resource
//! policy. Both upserts are conflict-tolerant: `clips` ignores a duplicate
//! `clip_id` (at-least-once event-bus delivery should not double-insert),
//! `streamers` refreshes `last_seen_at` on every poll.

mod db;

pub use db::init_schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clipwatch_core::{ClipRecord, ClipwatchError, Result};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::Pool;

/// A clip row joined against its streamer login, as returned to API callers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClipListing {
    pub id: i64,
    pub broadcaster_id: i64,
    pub clip_id: String,
    pub embed_url: String,
    pub thumbnail_url: String,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub streamer_login: Option<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert a clip row; a duplicate `clip_id` is silently ignored.
    async fn upsert_clip(&self, clip: &ClipRecord) -> Result<()>;

    /// Upsert `(channel_id, login, last_seen)` into the streamer catalog.
    async fn upsert_streamer(&self, channel_id: u64, login: &str, last_seen: DateTime<Utc>) -> Result<()>;

    /// Clips detected within `[start, end]`, optionally filtered to a single
    /// `broadcaster_id`, most recent first, capped at `limit`.
    async fn list_clips(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
        broadcaster_id: Option<i64>,
    ) -> Result<Vec<ClipListing>>;

    /// A single clip by its Twitch `clip_id`.
    async fn get_clip_by_id(&self, clip_id: &str) -> Result<Option<ClipListing>>;

    /// Used by the API's `/health` handler to confirm the pool is alive.
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<Postgres>,
}

impl PgCatalog {
    pub async fn connect(dsn: &str, min_connections: u32, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(|e| ClipwatchError::Fatal(format!("cannot connect to catalog: {e}")))?;

        init_schema(&pool)
            .await
            .map_err(|e| ClipwatchError::Fatal(format!("catalog schema init failed: {e}")))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn upsert_clip(&self, clip: &ClipRecord) -> Result<()> {
        let channel_id = clip.channel_id as i64;
        sqlx::query(
            "INSERT INTO clips (broadcaster_id, clip_id, embed_url, thumbnail_url, detected_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (clip_id) DO NOTHING",
        )
        .bind(channel_id)
        .bind(&clip.clip_id)
        .bind(&clip.embed_url)
        .bind(&clip.thumbnail_url)
        .bind(clip.detected_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ClipwatchError::Transient(format!("clip upsert failed: {e}")))?;
        Ok(())
    }

    async fn upsert_streamer(
        &self,
        channel_id: u64,
        login: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        let channel_id = channel_id as i64;
        sqlx::query(
            "INSERT INTO streamers (streamer_id, streamer_login, last_seen_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (streamer_id) DO UPDATE
                SET streamer_login = EXCLUDED.streamer_login,
                    last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(channel_id)
        .bind(login)
        .bind(last_seen)
        .execute(&self.pool)
        .await
        .map_err(|e| ClipwatchError::Transient(format!("streamer upsert failed: {e}")))?;
        Ok(())
    }

    async fn list_clips(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
        broadcaster_id: Option<i64>,
    ) -> Result<Vec<ClipListing>> {
        sqlx::query_as::<_, ClipListing>(
            "SELECT c.id, c.broadcaster_id, c.clip_id, c.embed_url, c.thumbnail_url,
                    c.detected_at, c.created_at, s.streamer_login
             FROM clips c
             LEFT JOIN streamers s ON c.broadcaster_id = s.streamer_id
             WHERE c.detected_at >= $1 AND c.detected_at <= $2
               AND ($4::bigint IS NULL OR c.broadcaster_id = $4)
             ORDER BY c.detected_at DESC
             LIMIT $3",
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .bind(broadcaster_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ClipwatchError::Transient(format!("clip listing query failed: {e}")))
    }

    async fn get_clip_by_id(&self, clip_id: &str) -> Result<Option<ClipListing>> {
        sqlx::query_as::<_, ClipListing>(
            "SELECT c.id, c.broadcaster_id, c.clip_id, c.embed_url, c.thumbnail_url,
                    c.detected_at, c.created_at, s.streamer_login
             FROM clips c
             LEFT JOIN streamers s ON c.broadcaster_id = s.streamer_id
             WHERE c.clip_id = $1",
        )
        .bind(clip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ClipwatchError::Transient(format!("clip lookup query failed: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ClipwatchError::Transient(format!("catalog ping failed: {e}")))?;
        Ok(())
    }
}
