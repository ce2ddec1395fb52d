//! The source pool collaborator.
//!
//! A [`SourcePool`] owns the identities (accounts, proxies) used to query the
//! upstream service and does its own rate limiting: when every identity is
//! limited, its streams wait instead of failing. The harvester only layers
//! pacing and timeouts on top.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use futures::stream::{self, BoxStream, StreamExt};
//! use topic_harvest::models::{PoolStats, RawItem};
//! use topic_harvest::source::SourcePool;
//!
//! pub struct EmptyPool;
//!
//! #[async_trait]
//! impl SourcePool for EmptyPool {
//!     fn name(&self) -> &str { "empty" }
//!
//!     async fn stats(&self) -> Result<PoolStats> {
//!         Ok(PoolStats { active: 1, total: 1, locked: 0 })
//!     }
//!
//!     fn search<'a>(&'a self, _query: &'a str, _limit: usize) -> BoxStream<'a, Result<RawItem>> {
//!         stream::empty().boxed()
//!     }
//!
//!     fn fetch_replies<'a>(&'a self, _item_id: i64, _limit: usize) -> BoxStream<'a, Result<RawItem>> {
//!         stream::empty().boxed()
//!     }
//!
//!     async fn reset_locks(&self) -> Result<()> { Ok(()) }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::warn;

use crate::models::{Item, PoolStats, RawItem};

#[async_trait]
pub trait SourcePool: Send + Sync {
    /// Short label used in logs (e.g. `"http:127.0.0.1:8700"`).
    fn name(&self) -> &str;

    /// Current identity availability.
    async fn stats(&self) -> Result<PoolStats>;

    /// Items matching `query`, in source order, at most `limit` of them.
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxStream<'a, Result<RawItem>>;

    /// Replies to `item_id`, in source order, at most `limit` of them.
    fn fetch_replies<'a>(&'a self, item_id: i64, limit: usize) -> BoxStream<'a, Result<RawItem>>;

    /// Release identity locks left behind by an interrupted process.
    async fn reset_locks(&self) -> Result<()>;
}

/// Normalize raw items, dropping (and logging) any that lack an id.
///
/// `worker` is the fetch slot the items came from, if any.
pub fn normalize(
    raw: Vec<RawItem>,
    parent_id: Option<i64>,
    unit: &str,
    worker: Option<usize>,
) -> Vec<Item> {
    let total = raw.len();
    let items: Vec<Item> = raw
        .into_iter()
        .filter_map(|r| Item::from_raw(r, parent_id))
        .collect();
    if items.len() < total {
        warn!(
            worker,
            unit,
            skipped = total - items.len(),
            "dropped raw items without an id"
        );
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_skips_items_without_id() {
        let raw = vec![
            RawItem {
                id: Some(1),
                ..Default::default()
            },
            RawItem::default(),
            RawItem {
                id: Some(3),
                text: Some("RT @x: hi".to_string()),
                ..Default::default()
            },
        ];
        let items = normalize(raw, Some(9), "rust", Some(1));
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(items.iter().all(|i| i.parent_id == Some(9)));
        assert!(items[1].is_repost);
    }
}
