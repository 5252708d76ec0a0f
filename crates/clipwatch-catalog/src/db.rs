use sqlx::postgres::Postgres;
use sqlx::Pool;

/// Create the `clips`/`streamers` tables if they don't already exist.
pub async fn init_schema(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS clips (
            id             BIGSERIAL PRIMARY KEY,
            broadcaster_id BIGINT NOT NULL,
            clip_id        TEXT NOT NULL UNIQUE,
            embed_url      TEXT NOT NULL,
            thumbnail_url  TEXT NOT NULL,
            detected_at    TIMESTAMPTZ NOT NULL,
            created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_clips_broadcaster_id ON clips (broadcaster_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS streamers (
            streamer_id    BIGINT PRIMARY KEY,
            streamer_login TEXT NOT NULL,
            last_seen_at   TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
