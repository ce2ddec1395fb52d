//! The pipeline controller.
//!
//! A run moves through these stages:
//!
//! ```text
//! Init → Fetching → Expanding → Storing → Done
//!   └──────────┴──────────┴──────────┴──→ Failed
//! ```
//!
//! `Fetching` and `Storing` are checkpointed and skipped on resume once
//! finished. `Expanding` is cheap enough to redo and always runs. Any error
//! other than an operator interrupt moves the run to `Failed`, records the
//! error on the checkpoint and leaves the checkpoint in place so the next
//! invocation resumes. An interrupt also leaves the checkpoint in place but
//! is returned as [`HarvestError::Interrupted`] instead of a failed outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointStore, MAX_TOPIC_RETRIES};
use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::expand::ThreadExpander;
use crate::fetch::FetchEngine;
use crate::pacing::Pacing;
use crate::source::SourcePool;
use crate::store::ItemStore;

/// Storage topic for reply-thread items.
pub const REPLIES_TOPIC: &str = "replies";

/// Every pass either completes a pending topic or burns one of its retries,
/// so this many passes always drain `topics_remaining`.
const MAX_FETCH_PASSES: u32 = MAX_TOPIC_RETRIES + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetching,
    Expanding,
    Storing,
    Done,
    Failed,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub run_id: String,
    pub resumed: bool,
    /// Items from topic searches, including those restored from the checkpoint.
    pub items_collected: usize,
    pub replies_collected: usize,
    /// Rows inserted by this invocation.
    pub items_stored: u64,
    /// Authoritative item count of the run in the store.
    pub run_item_count: i64,
    pub fetch_elapsed: Duration,
    pub store_elapsed: Duration,
    pub fetch_skipped: bool,
    pub store_skipped: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(PipelineReport),
    /// The run stopped at `stage`; the checkpoint is kept for resume.
    Failed { stage: Stage, error: String },
}

pub struct Pipeline {
    config: Config,
    checkpoint: CheckpointStore,
    engine: FetchEngine,
    expander: ThreadExpander,
    store: Box<dyn ItemStore>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(
        config: Config,
        pool: Arc<dyn SourcePool>,
        store: Box<dyn ItemStore>,
    ) -> Result<Self> {
        let pacing = Pacing::from(&config.pacing);
        Self::with_pacing(config, pool, store, pacing)
    }

    /// Like [`new`](Self::new) with an explicit pacing policy instead of the
    /// configured one.
    pub fn with_pacing(
        config: Config,
        pool: Arc<dyn SourcePool>,
        store: Box<dyn ItemStore>,
        pacing: Pacing,
    ) -> Result<Self> {
        let checkpoint = CheckpointStore::new(&config.checkpoint.path)?;
        let engine = FetchEngine::new(pool.clone(), pacing.clone(), &config.source.language);
        let expander = ThreadExpander::new(pool, pacing);

        Ok(Self {
            config,
            checkpoint,
            engine,
            expander,
            store,
            stage: Stage::Init,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Run every stage to completion.
    ///
    /// Returns `Err` only for [`HarvestError::Interrupted`]; every other
    /// failure is reported as [`RunOutcome::Failed`]. The store is closed
    /// either way.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunOutcome> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HarvestError::Interrupted),
            r = self.run_stages() => r,
        };

        let outcome = match result {
            Ok(report) => Ok(RunOutcome::Completed(report)),
            Err(HarvestError::Interrupted) => {
                warn!(stage = ?self.stage, "interrupted, progress saved to checkpoint");
                info!("run again to resume from where it left off");
                Err(HarvestError::Interrupted)
            }
            Err(e) => {
                let stage = self.stage;
                self.checkpoint.set_error(&e.to_string());
                self.stage = Stage::Failed;
                error!(?stage, error = %e, "pipeline failed");
                info!("progress saved, run again to resume");
                Ok(RunOutcome::Failed {
                    stage,
                    error: e.to_string(),
                })
            }
        };

        self.store.close().await;
        outcome
    }

    async fn run_stages(&mut self) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        // Init
        self.stage = Stage::Init;
        self.config.validate()?;

        report.resumed = self.checkpoint.should_resume();
        if report.resumed {
            let state = self.checkpoint.get_state()?;
            info!(
                run_id = %state.run_id,
                topics_done = state.topics_completed.len(),
                topics_total = state.topic_count(),
                fetch_done = state.stage1_complete,
                store_done = state.stage2_complete,
                "resuming from checkpoint"
            );
        } else {
            info!("starting fresh pipeline run");
            self.checkpoint.start_new_run(&self.config.topics)?;
        }
        report.run_id = self.checkpoint.get_state()?.run_id.clone();

        if let Err(e) = self.engine.pool().reset_locks().await {
            warn!(error = %e, "could not reset stale pool locks");
        }
        self.check_pool().await?;
        self.store.start_run(&report.run_id).await?;

        // Fetching
        self.stage = Stage::Fetching;
        let fetch_start = Instant::now();
        if self.checkpoint.get_state()?.stage1_complete {
            info!("[1/3] fetch already complete, skipping");
            report.fetch_skipped = true;
        } else {
            self.fetch_all().await?;
            self.checkpoint.complete_stage1()?;
        }
        report.fetch_elapsed = fetch_start.elapsed();

        let items = self.checkpoint.get_collected_items()?;
        if items.is_empty() {
            return Err(HarvestError::NothingCollected(report.run_id));
        }
        report.items_collected = items.len();
        info!(
            items = items.len(),
            elapsed_secs = report.fetch_elapsed.as_secs_f64(),
            "items collected"
        );

        // Expanding
        self.stage = Stage::Expanding;
        info!("[2/3] expanding reply threads for top items");
        let scraping = &self.config.scraping;
        let replies = self
            .expander
            .expand_top_items(
                &items,
                scraping.top_items_for_replies,
                scraping.replies_per_item,
                scraping.search_timeout(),
            )
            .await;
        report.replies_collected = replies.len();

        // Storing
        self.stage = Stage::Storing;
        let store_start = Instant::now();
        if self.checkpoint.get_state()?.stage2_complete {
            info!("[3/3] storage already complete, skipping");
            report.store_skipped = true;
            report.run_item_count = self.store.get_run_count(&report.run_id).await?;
        } else {
            info!("[3/3] saving to database");
            for (topic, group) in self.checkpoint.collected_by_topic()? {
                report.items_stored += self
                    .store
                    .store_items(&group, &report.run_id, &topic)
                    .await?;
            }
            if !replies.is_empty() {
                let stored = self
                    .store
                    .store_items(&replies, &report.run_id, REPLIES_TOPIC)
                    .await?;
                info!(stored, "reply items stored");
                report.items_stored += stored;
            }
            report.run_item_count = self.store.complete_run(&report.run_id).await?;
            self.checkpoint.complete_stage2()?;
        }
        report.store_elapsed = store_start.elapsed();

        self.checkpoint.clear()?;
        self.stage = Stage::Done;

        info!(
            run_id = %report.run_id,
            items = report.items_collected,
            replies = report.replies_collected,
            stored = report.items_stored,
            in_db = report.run_item_count,
            fetch_secs = report.fetch_elapsed.as_secs_f64(),
            store_secs = report.store_elapsed.as_secs_f64(),
            "pipeline complete"
        );
        Ok(report)
    }

    /// Fail when the pool has no identities at all; warn when all are limited.
    async fn check_pool(&self) -> Result<()> {
        match self.engine.pool().stats().await {
            Ok(stats) if stats.total == 0 => Err(HarvestError::PoolUnavailable(format!(
                "{} has no identities configured",
                self.engine.pool().name()
            ))),
            Ok(stats) if stats.active == 0 => {
                warn!(
                    total = stats.total,
                    "all identities are rate-limited or inactive"
                );
                Ok(())
            }
            Ok(stats) => {
                info!(active = stats.active, total = stats.total, "identities available");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not check identity availability");
                Ok(())
            }
        }
    }

    /// Fetch passes over `topics_remaining` until it is empty.
    async fn fetch_all(&mut self) -> Result<()> {
        let limit = self.config.scraping.per_topic_limit;
        let timeout = self.config.scraping.search_timeout();

        for pass in 0..MAX_FETCH_PASSES {
            let state = self.checkpoint.get_state()?;
            if state.topics_remaining.is_empty() {
                return Ok(());
            }
            let remaining = state.topics_remaining.clone();
            let completed = state.topics_completed.clone();

            if pass > 0 {
                info!(pass, pending = remaining.len(), "retrying topics with no results");
                tokio::time::sleep(self.engine.pacing().batch_cooldown).await;
            } else {
                info!(
                    remaining = remaining.len(),
                    completed = completed.len(),
                    "[1/3] fetching topics"
                );
            }

            let checkpoint = &mut self.checkpoint;
            self.engine
                .fetch_topics_incremental(
                    &remaining,
                    limit,
                    |topic, items| checkpoint.mark_topic_complete(topic, items).map(|_| ()),
                    &completed,
                    timeout,
                )
                .await?;
        }

        let pending = &self.checkpoint.get_state()?.topics_remaining;
        if !pending.is_empty() {
            warn!(?pending, "topics still pending after all fetch passes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_passes_cover_retry_budget() {
        // Three empty attempts are retried, the fourth exhausts the topic.
        assert_eq!(MAX_FETCH_PASSES, 4);
    }
}
