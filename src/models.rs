//! Core data models used throughout the harvester.
//!
//! These types represent the posts, pool statistics, and run records that flow
//! through the fetch → expand → store pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw item as reported by the source pool, before normalization.
///
/// Every field except `id` may be absent; the pool forwards whatever the
/// upstream service returned.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawItem {
    pub id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author_handle: Option<String>,
    #[serde(default)]
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub repost_count: Option<u64>,
    #[serde(default)]
    pub reply_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Normalized post record. Immutable once constructed.
///
/// This is also the checkpoint serialization format: fields added after the
/// first release carry `#[serde(default)]` so older checkpoints still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub text: String,
    pub author_handle: String,
    #[serde(default = "unknown_display_name")]
    pub author_display_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub is_repost: bool,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

fn unknown_display_name() -> String {
    "Unknown".to_string()
}

impl Item {
    /// Normalize a raw pool item. `parent_id` is set for reply-thread items.
    ///
    /// Returns `None` when the raw item carries no id.
    pub fn from_raw(raw: RawItem, parent_id: Option<i64>) -> Option<Self> {
        let id = raw.id?;
        let text = raw.text.unwrap_or_default();
        let is_repost = text.starts_with("RT @");

        Some(Self {
            id,
            text,
            author_handle: raw.author_handle.unwrap_or_else(|| "unknown".to_string()),
            author_display_name: raw
                .author_display_name
                .unwrap_or_else(unknown_display_name),
            created_at: raw.created_at,
            like_count: raw.like_count.unwrap_or(0),
            repost_count: raw.repost_count.unwrap_or(0),
            reply_count: raw.reply_count.unwrap_or(0),
            view_count: raw.view_count,
            language: raw.language,
            hashtags: raw.hashtags,
            is_repost,
            parent_id,
        })
    }

    /// Likes plus reposts. Replies and views do not count toward ranking.
    pub fn engagement(&self) -> u64 {
        self.like_count.saturating_add(self.repost_count)
    }
}

/// Availability snapshot of the source pool's identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PoolStats {
    /// Identities usable right now.
    #[serde(default)]
    pub active: usize,
    /// All identities known to the pool.
    #[serde(default)]
    pub total: usize,
    /// Identities currently rate-limited or locked.
    #[serde(default)]
    pub locked: usize,
}

/// One row of the run history kept by the store.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Count stamped by `complete_run`; zero until the run completes.
    pub item_count: i64,
    /// Rows currently stored for the run.
    pub live_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_defaults() {
        let raw = RawItem {
            id: Some(42),
            text: Some("hello".to_string()),
            ..Default::default()
        };
        let item = Item::from_raw(raw, None).unwrap();
        assert_eq!(item.id, 42);
        assert_eq!(item.author_handle, "unknown");
        assert_eq!(item.author_display_name, "Unknown");
        assert_eq!(item.like_count, 0);
        assert!(!item.is_repost);
        assert!(item.parent_id.is_none());
    }

    #[test]
    fn test_from_raw_detects_repost_and_parent() {
        let raw = RawItem {
            id: Some(7),
            text: Some("RT @someone: original".to_string()),
            like_count: Some(3),
            repost_count: Some(4),
            ..Default::default()
        };
        let item = Item::from_raw(raw, Some(99)).unwrap();
        assert!(item.is_repost);
        assert_eq!(item.parent_id, Some(99));
        assert_eq!(item.engagement(), 7);
    }

    #[test]
    fn test_from_raw_without_id() {
        let raw = RawItem {
            text: Some("orphan".to_string()),
            ..Default::default()
        };
        assert!(Item::from_raw(raw, None).is_none());
    }
}
