//! Engagement ranking and reply-thread expansion.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{HarvestError, Result};
use crate::models::Item;
use crate::pacing::{drain_paced, Pacing};
use crate::source::{normalize, SourcePool};

/// The `top_n` items with the highest likes + reposts.
///
/// Ties keep their input order.
pub fn select_top(items: &[Item], top_n: usize) -> Vec<&Item> {
    let mut ranked: Vec<&Item> = items.iter().collect();
    ranked.sort_by_key(|item| Reverse(item.engagement()));
    ranked.truncate(top_n);
    ranked
}

pub struct ThreadExpander {
    pool: Arc<dyn SourcePool>,
    pacing: Pacing,
}

impl ThreadExpander {
    pub fn new(pool: Arc<dyn SourcePool>, pacing: Pacing) -> Self {
        Self { pool, pacing }
    }

    /// Replies to one item, each tagged with `parent_id = item_id`.
    ///
    /// `timeout` is the caller's soft budget and is only logged. The wait is
    /// bounded by the reply safety timeout, and hitting it keeps partial
    /// results.
    pub async fn fetch_replies(
        &self,
        item_id: i64,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<Item>> {
        let unit = format!("replies:{}", item_id);
        let bound = self.pacing.reply_safety_timeout;
        debug!(
            unit = %unit,
            timeout_secs = timeout.as_secs(),
            safety_timeout_secs = bound.as_secs(),
            "fetching replies"
        );

        let drained = drain_paced(
            self.pool.fetch_replies(item_id, limit),
            self.pacing.page_size,
            self.pacing.page_pause,
            bound,
            &unit,
            None,
        )
        .await
        .map_err(|e| HarvestError::fetch_failure(&unit, e))?;

        if drained.timed_out {
            let err = HarvestError::TimeoutExceeded {
                unit: unit.clone(),
                after_secs: bound.as_secs(),
            };
            error!(
                error = %err,
                collected = drained.items.len(),
                "reply safety timeout reached, keeping partial results"
            );
        }

        Ok(normalize(drained.items, Some(item_id), &unit, None))
    }

    /// Fetch reply threads for the `top_n` most engaged items, one at a time.
    ///
    /// A failed thread is logged and skipped.
    pub async fn expand_top_items(
        &self,
        items: &[Item],
        top_n: usize,
        replies_per_item: usize,
        timeout: Duration,
    ) -> Vec<Item> {
        let top = select_top(items, top_n);
        if top.is_empty() {
            return Vec::new();
        }

        info!(items = top.len(), replies_per_item, "expanding reply threads");

        let mut replies = Vec::new();
        for (i, item) in top.iter().enumerate() {
            if i > 0 {
                let gap = self.pacing.reply_gap.sample();
                debug!(gap_secs = gap.as_secs_f64(), "reply gap");
                tokio::time::sleep(gap).await;
            }

            match self.fetch_replies(item.id, replies_per_item, timeout).await {
                Ok(thread) => {
                    info!(
                        item_id = item.id,
                        engagement = item.engagement(),
                        replies = thread.len(),
                        "thread expanded"
                    );
                    replies.extend(thread);
                }
                Err(e) => error!(item_id = item.id, error = %e, "thread expansion failed"),
            }
        }

        info!(replies = replies.len(), "reply expansion complete");
        replies
    }
}
