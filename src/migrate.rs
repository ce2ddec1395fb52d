use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the run history and item tables if they do not exist.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per pipeline run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            item_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Collected posts and replies; an item is stored at most once per run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            item_id INTEGER NOT NULL,
            topic TEXT NOT NULL,
            text TEXT NOT NULL,
            author_handle TEXT NOT NULL,
            author_display_name TEXT NOT NULL,
            created_at INTEGER,
            like_count INTEGER NOT NULL DEFAULT 0,
            repost_count INTEGER NOT NULL DEFAULT 0,
            reply_count INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER,
            language TEXT,
            hashtags_json TEXT NOT NULL DEFAULT '[]',
            is_repost INTEGER NOT NULL DEFAULT 0,
            parent_id INTEGER,
            collected_at INTEGER NOT NULL,
            UNIQUE(run_id, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_run_id ON items(run_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_topic ON items(run_id, topic)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_parent_id ON items(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// `harvest init`: create the database and its schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}
