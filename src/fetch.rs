//! Topic fetching in rotating worker batches.
//!
//! Topics are searched at most [`Pacing::max_batch_workers`] at a time. Each
//! concurrent fetch in a batch is assigned a worker slot; slots rotate
//! round-robin over the pool's active identity count so consecutive batches
//! use different slots and recently used identities get to cool down:
//!
//! ```text
//! 5 active identities, 2 workers per batch
//! batch 0 → slots [0, 1]
//! batch 1 → slots [2, 3]
//! batch 2 → slots [4, 0]
//! batch 3 → slots [1, 2]
//! ```
//!
//! All fetches of a batch run interleaved on the calling task; nothing is
//! spawned. The per-topic completion callback therefore never runs
//! concurrently with anything else the caller does.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{HarvestError, Result};
use crate::models::Item;
use crate::pacing::{drain_paced, Pacing};
use crate::source::{normalize, SourcePool};

/// Limit above which a single topic is likely to trip rate limits.
const HIGH_LIMIT_WARNING: usize = 100;

/// Worker slots for batch number `batch`.
///
/// Slot `i` of batch `k` is `(k * batch_size + i) mod total_slots`.
pub fn worker_slots(batch: usize, batch_size: usize, total_slots: usize) -> Vec<usize> {
    let total_slots = total_slots.max(1);
    let base = (batch * batch_size) % total_slots;
    (0..batch_size).map(|i| (base + i) % total_slots).collect()
}

pub struct FetchEngine {
    pool: Arc<dyn SourcePool>,
    pacing: Pacing,
    language: String,
}

impl FetchEngine {
    pub fn new(pool: Arc<dyn SourcePool>, pacing: Pacing, language: impl Into<String>) -> Self {
        Self {
            pool,
            pacing,
            language: language.into(),
        }
    }

    pub fn pool(&self) -> &Arc<dyn SourcePool> {
        &self.pool
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Fetch every topic in `topics` not listed in `skip_topics`.
    ///
    /// `on_topic_complete` fires once per attempted topic, as soon as that
    /// topic's fetch resolves, with an empty slice when the fetch failed. An
    /// error from the callback stops the engine and is returned; per-topic
    /// fetch failures never are.
    pub async fn fetch_topics_incremental<F>(
        &self,
        topics: &[String],
        per_topic_limit: usize,
        mut on_topic_complete: F,
        skip_topics: &[String],
        timeout: Duration,
    ) -> Result<Vec<Item>>
    where
        F: FnMut(&str, &[Item]) -> Result<()>,
    {
        let remaining: Vec<&String> = topics
            .iter()
            .filter(|t| !skip_topics.contains(t))
            .collect();

        if remaining.is_empty() {
            info!("no topics remaining to fetch");
            return Ok(Vec::new());
        }

        let active_count = match self.pool.stats().await {
            Ok(stats) if stats.active > 0 => stats.active,
            Ok(_) => 1,
            Err(e) => {
                warn!(error = %e, "could not read pool stats, assuming one active identity");
                1
            }
        };
        let batch_size = active_count.min(self.pacing.max_batch_workers).max(1);

        info!(
            remaining = remaining.len(),
            workers_per_batch = batch_size,
            slots = active_count,
            "incremental fetch starting"
        );

        let mut collected = Vec::new();
        let batch_count = remaining.len().div_ceil(batch_size);

        for (batch, batch_topics) in remaining.chunks(batch_size).enumerate() {
            let slots = worker_slots(batch, batch_size, active_count);
            info!(batch, ?slots, topics = batch_topics.len(), "batch starting");

            let mut in_flight: FuturesUnordered<_> = batch_topics
                .iter()
                .zip(slots)
                .map(|(topic, worker)| async move {
                    let result = self
                        .search_topic(topic, per_topic_limit, timeout, worker)
                        .await;
                    (topic.as_str(), worker, result)
                })
                .collect();

            while let Some((topic, worker, result)) = in_flight.next().await {
                let items = match result {
                    Ok(items) => items,
                    Err(e) => {
                        error!(worker, topic, error = %e, "topic fetch failed");
                        Vec::new()
                    }
                };
                info!(worker, topic, items = items.len(), "topic fetched");
                on_topic_complete(topic, &items)?;
                collected.extend(items);
            }

            if batch + 1 < batch_count {
                let cooldown = self.pacing.batch_cooldown;
                debug!(cooldown_secs = cooldown.as_secs_f64(), "batch cooldown");
                tokio::time::sleep(cooldown).await;
            }
        }

        info!(
            items = collected.len(),
            topics = remaining.len(),
            "incremental fetch complete"
        );
        Ok(collected)
    }

    /// Search one topic on behalf of worker slot `worker`.
    ///
    /// `timeout` is the caller's soft budget and is only logged; it is widened
    /// when the whole pool is rate-limited. The wait is bounded by the search
    /// safety timeout, and hitting it returns partial results.
    pub async fn search_topic(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
        worker: usize,
    ) -> Result<Vec<Item>> {
        let search_query = format!("{} lang:{}", query, self.language);
        let mut soft = timeout;

        match self.pool.stats().await {
            Ok(stats) if stats.total > 0 && stats.active == 0 => {
                soft = self.pacing.widened_timeout(soft);
                warn!(
                    worker,
                    total = stats.total,
                    timeout_secs = soft.as_secs(),
                    "all identities rate-limited, widening timeout to wait for recovery"
                );
            }
            Ok(_) => {}
            Err(e) => debug!(worker, error = %e, "could not check identity availability"),
        }

        info!(
            worker,
            query = %search_query,
            limit,
            timeout_secs = soft.as_secs(),
            safety_timeout_secs = self.pacing.search_safety_timeout.as_secs(),
            "searching"
        );
        if limit > HIGH_LIMIT_WARNING {
            warn!(worker, limit, "high per-topic limit may trigger rate limits quickly");
        }

        let jitter = self.pacing.initial_jitter.sample();
        debug!(worker, jitter_secs = jitter.as_secs_f64(), "initial jitter");
        tokio::time::sleep(jitter).await;

        let bound = self.pacing.search_safety_timeout;
        let drained = drain_paced(
            self.pool.search(&search_query, limit),
            self.pacing.page_size,
            self.pacing.page_pause,
            bound,
            query,
            Some(worker),
        )
        .await
        .map_err(|e| HarvestError::fetch_failure(query, e))?;

        if drained.timed_out {
            let err = HarvestError::TimeoutExceeded {
                unit: query.to_string(),
                after_secs: bound.as_secs(),
            };
            error!(
                worker,
                error = %err,
                collected = drained.items.len(),
                "safety timeout reached, keeping partial results"
            );
        }

        let items = normalize(drained.items, None, query, Some(worker));
        info!(worker, query, items = items.len(), "search finished");
        Ok(items)
    }
}
