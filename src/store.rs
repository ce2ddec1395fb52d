//! Run history and item persistence.
//!
//! [`ItemStore`] is the seam the pipeline writes through. [`SqliteItemStore`]
//! is the production implementation; dedup within a run is enforced by the
//! `UNIQUE(run_id, item_id)` constraint, so storing the same batch twice is
//! harmless.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::db;
use crate::migrate;
use crate::models::{Item, RunRecord};

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Register a run. Calling it again for the same id is a no-op.
    async fn start_run(&self, run_id: &str) -> Result<()>;

    /// Insert items under `topic`, skipping ids already stored for this run.
    ///
    /// Returns the number of rows actually inserted.
    async fn store_items(&self, items: &[Item], run_id: &str, topic: &str) -> Result<u64>;

    /// Stamp the run complete and return its authoritative item count.
    async fn complete_run(&self, run_id: &str) -> Result<i64>;

    async fn get_run_count(&self, run_id: &str) -> Result<i64>;

    async fn close(&self);
}

pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn connect(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.run_id,
                r.started_at,
                r.completed_at,
                r.item_count,
                (SELECT COUNT(*) FROM items i WHERE i.run_id = r.run_id) AS live_count
            FROM runs r
            ORDER BY r.run_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RunRecord {
                run_id: row.get("run_id"),
                started_at: row.get("started_at"),
                completed_at: row.get("completed_at"),
                item_count: row.get("item_count"),
                live_count: row.get("live_count"),
            })
            .collect())
    }

    /// Item counts per topic for one run.
    pub async fn topic_counts(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT topic, COUNT(*) AS n FROM items WHERE run_id = ? GROUP BY topic ORDER BY n DESC, topic",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("topic"), row.get("n")))
            .collect())
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn start_run(&self, run_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (run_id, started_at) VALUES (?, ?) ON CONFLICT(run_id) DO NOTHING",
        )
        .bind(run_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        debug!(run_id, "run registered");
        Ok(())
    }

    async fn store_items(&self, items: &[Item], run_id: &str, topic: &str) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let collected_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for item in items {
            let hashtags_json = serde_json::to_string(&item.hashtags)?;
            let result = sqlx::query(
                r#"
                INSERT INTO items (
                    run_id, item_id, topic, text, author_handle, author_display_name,
                    created_at, like_count, repost_count, reply_count, view_count,
                    language, hashtags_json, is_repost, parent_id, collected_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(run_id, item_id) DO NOTHING
                "#,
            )
            .bind(run_id)
            .bind(item.id)
            .bind(topic)
            .bind(&item.text)
            .bind(&item.author_handle)
            .bind(&item.author_display_name)
            .bind(item.created_at.map(|t| t.timestamp()))
            .bind(i64::try_from(item.like_count)?)
            .bind(i64::try_from(item.repost_count)?)
            .bind(i64::try_from(item.reply_count)?)
            .bind(item.view_count.map(i64::try_from).transpose()?)
            .bind(&item.language)
            .bind(&hashtags_json)
            .bind(item.is_repost)
            .bind(item.parent_id)
            .bind(collected_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        info!(
            run_id,
            topic,
            offered = items.len(),
            inserted,
            "items stored"
        );
        Ok(inserted)
    }

    async fn complete_run(&self, run_id: &str) -> Result<i64> {
        let count = self.get_run_count(run_id).await?;

        let result = sqlx::query(
            "UPDATE runs SET completed_at = ?, item_count = ? WHERE run_id = ? AND completed_at IS NULL",
        )
        .bind(Utc::now().timestamp())
        .bind(count)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(run_id, "run already stamped complete");
        }
        Ok(count)
    }

    async fn get_run_count(&self, run_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE run_id = ?")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
