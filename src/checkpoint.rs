//! Durable pipeline progress.
//!
//! The checkpoint is a single JSON file holding the [`PipelineState`] of the
//! current run. It is rewritten in full after every topic completion and every
//! stage transition, so a crash loses at most the in-flight batch.
//!
//! # Write protocol
//!
//! Every save serializes the whole state into a temporary file next to the
//! target and renames it over the checkpoint. Readers see either the previous
//! complete file or the new one, never a partial write.
//!
//! # Read protocol
//!
//! A missing, unreadable, or malformed file means "no checkpoint". Loading
//! never fails; the pipeline simply starts a fresh run.
//!
//! # Single writer
//!
//! No file locking is taken. Two processes sharing a checkpoint path will
//! overwrite each other's progress.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::error::{HarvestError, Result};
use crate::models::Item;

/// Empty results a topic may return before it is given up on.
pub const MAX_TOPIC_RETRIES: u32 = 3;

/// Storage topic for checkpointed items that carry no topic tag.
pub const UNTAGGED_TOPIC: &str = "broad";

/// Resumable progress record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// `YYYYMMDD` of the day the run started.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,

    /// Fetch stage finished.
    #[serde(default)]
    pub stage1_complete: bool,
    /// Store stage finished.
    #[serde(default)]
    pub stage2_complete: bool,

    #[serde(default)]
    pub topics_completed: Vec<String>,
    #[serde(default)]
    pub topics_remaining: Vec<String>,
    #[serde(default)]
    pub collected_items: Vec<CheckpointItem>,
    #[serde(default)]
    pub retry_counts: BTreeMap<String, u32>,

    #[serde(default)]
    pub error: Option<String>,
}

impl PipelineState {
    fn new(run_id: String, topics: &[String]) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            last_updated: now,
            stage1_complete: false,
            stage2_complete: false,
            topics_completed: Vec::new(),
            topics_remaining: topics.to_vec(),
            collected_items: Vec::new(),
            retry_counts: BTreeMap::new(),
            error: None,
        }
    }

    /// Total number of topics this run covers.
    pub fn topic_count(&self) -> usize {
        self.topics_completed.len() + self.topics_remaining.len()
    }
}

/// A collected item plus the topic that produced it.
///
/// `topic` is absent in checkpoints written before per-item attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(flatten)]
    pub item: Item,
}

/// What [`CheckpointStore::mark_topic_complete`] decided for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicOutcome {
    /// Topic moved to completed with this many items.
    Completed { items: usize },
    /// Empty result; the topic stays pending for another attempt.
    RetryScheduled { attempt: u32 },
    /// Empty result after the retry budget ran out; force-completed with no items.
    Exhausted,
}

/// Run id for a calendar day.
pub fn run_id_for(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Run id for the current local day.
pub fn today_run_id() -> String {
    run_id_for(Local::now().date_naive())
}

/// Owner of the checkpoint file and the in-memory [`PipelineState`].
pub struct CheckpointStore {
    path: PathBuf,
    state: Option<PipelineState>,
}

impl CheckpointStore {
    /// Create a store for `path`, creating its parent directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::storage_io(parent, e))?;
        }
        debug!(path = %path.display(), "checkpoint store ready");
        Ok(Self { path, state: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a fresh run for today with every topic pending, and persist it.
    ///
    /// If the checkpoint cannot be written the previous in-memory state is
    /// restored.
    pub fn start_new_run(&mut self, topics: &[String]) -> Result<&PipelineState> {
        let run_id = today_run_id();
        let previous = self
            .state
            .replace(PipelineState::new(run_id.clone(), topics));
        if let Err(e) = self.save() {
            self.state = previous;
            return Err(e);
        }
        info!(run_id = %run_id, topics = topics.len(), "started new pipeline run");
        self.get_state()
    }

    /// Read the persisted checkpoint, replacing the in-memory state.
    ///
    /// Returns `None` when the file is absent or cannot be decoded.
    pub fn load(&mut self) -> Option<&PipelineState> {
        self.state = read_state(&self.path);
        if let Some(state) = &self.state {
            info!(run_id = %state.run_id, "loaded checkpoint");
        }
        self.state.as_ref()
    }

    /// Whether a checkpoint for today exists and has not finished storing.
    pub fn should_resume(&mut self) -> bool {
        self.should_resume_on(Local::now().date_naive())
    }

    /// [`should_resume`](Self::should_resume) against an explicit calendar day.
    pub fn should_resume_on(&mut self, today: NaiveDate) -> bool {
        let today = run_id_for(today);
        let Some(state) = self.load() else {
            return false;
        };

        if state.run_id != today {
            info!(
                checkpoint_run = %state.run_id,
                today = %today,
                "checkpoint is from another day, starting fresh"
            );
            return false;
        }
        if state.stage2_complete {
            info!(run_id = %state.run_id, "previous run already completed, starting fresh");
            return false;
        }
        true
    }

    pub fn get_state(&self) -> Result<&PipelineState> {
        self.state.as_ref().ok_or_else(|| {
            HarvestError::InvalidState(
                "no active checkpoint; call start_new_run() or load() first".to_string(),
            )
        })
    }

    fn state_mut(&mut self) -> Result<&mut PipelineState> {
        self.state.as_mut().ok_or_else(|| {
            HarvestError::InvalidState(
                "no active checkpoint; call start_new_run() or load() first".to_string(),
            )
        })
    }

    /// Record the result of one topic fetch and persist.
    ///
    /// An empty result schedules a retry until [`MAX_TOPIC_RETRIES`] is
    /// exceeded, after which the topic is force-completed with no items.
    pub fn mark_topic_complete(&mut self, topic: &str, items: &[Item]) -> Result<TopicOutcome> {
        let state = self.state_mut()?;

        let outcome = if items.is_empty() {
            let attempts = state.retry_counts.entry(topic.to_string()).or_insert(0);
            *attempts += 1;
            if *attempts <= MAX_TOPIC_RETRIES {
                TopicOutcome::RetryScheduled { attempt: *attempts }
            } else {
                TopicOutcome::Exhausted
            }
        } else {
            TopicOutcome::Completed { items: items.len() }
        };

        if !matches!(outcome, TopicOutcome::RetryScheduled { .. }) {
            state.topics_remaining.retain(|t| t != topic);
            if !state.topics_completed.iter().any(|t| t == topic) {
                state.topics_completed.push(topic.to_string());
            }
            state
                .collected_items
                .extend(items.iter().cloned().map(|item| CheckpointItem {
                    topic: Some(topic.to_string()),
                    item,
                }));
        }

        self.save()?;

        match outcome {
            TopicOutcome::Completed { items } => info!(topic, items, "topic complete"),
            TopicOutcome::RetryScheduled { attempt } => warn!(
                topic,
                attempt,
                max = MAX_TOPIC_RETRIES,
                "topic returned no items, retry scheduled"
            ),
            TopicOutcome::Exhausted => error!(
                topic,
                max = MAX_TOPIC_RETRIES,
                "topic returned no items after all retries, marking complete (empty)"
            ),
        }
        Ok(outcome)
    }

    /// Every checkpointed item, in collection order.
    pub fn get_collected_items(&self) -> Result<Vec<Item>> {
        Ok(self
            .get_state()?
            .collected_items
            .iter()
            .map(|entry| entry.item.clone())
            .collect())
    }

    /// Checkpointed items grouped by producing topic, in first-seen order.
    ///
    /// Untagged entries are grouped under [`UNTAGGED_TOPIC`].
    pub fn collected_by_topic(&self) -> Result<Vec<(String, Vec<Item>)>> {
        let mut groups: Vec<(String, Vec<Item>)> = Vec::new();
        for entry in &self.get_state()?.collected_items {
            let topic = entry.topic.as_deref().unwrap_or(UNTAGGED_TOPIC);
            match groups.iter_mut().find(|(t, _)| t == topic) {
                Some((_, items)) => items.push(entry.item.clone()),
                None => groups.push((topic.to_string(), vec![entry.item.clone()])),
            }
        }
        Ok(groups)
    }

    pub fn complete_stage1(&mut self) -> Result<()> {
        self.state_mut()?.stage1_complete = true;
        self.save()?;
        info!("stage 1 (fetch) complete");
        Ok(())
    }

    pub fn complete_stage2(&mut self) -> Result<()> {
        self.state_mut()?.stage2_complete = true;
        self.save()?;
        info!("stage 2 (store) complete");
        Ok(())
    }

    /// Remove the checkpoint file and drop the in-memory state.
    ///
    /// Refuses while a loaded run has not finished storing.
    pub fn clear(&mut self) -> Result<()> {
        if let Some(state) = &self.state {
            if !state.stage2_complete {
                return Err(HarvestError::InvalidState(format!(
                    "refusing to clear checkpoint for run {} before storage completed",
                    state.run_id
                )));
            }
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HarvestError::storage_io(&self.path, e)),
        }
        self.state = None;
        info!("checkpoint cleared");
        Ok(())
    }

    /// Record an error message. Best effort: never fails.
    pub fn set_error(&mut self, message: &str) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.error = Some(message.to_string());
        if let Err(e) = self.save() {
            warn!(error = %e, "could not persist error to checkpoint");
        }
    }

    /// Persist the in-memory state. No-op before a run is started or loaded.
    pub fn save(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.last_updated = Utc::now();

        let bytes = serde_json::to_vec_pretty(&*state)
            .map_err(|e| HarvestError::storage_io(&self.path, e))?;
        write_atomic(&self.path, &bytes)?;
        debug!("checkpoint saved");
        Ok(())
    }
}

fn read_state(path: &Path) -> Option<PipelineState> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no checkpoint file found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "checkpoint unreadable, ignoring");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            error!(path = %path.display(), error = %e, "checkpoint corrupt, ignoring");
            None
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| HarvestError::storage_io(path, e))?;
    tmp.write_all(bytes)
        .map_err(|e| HarvestError::storage_io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| HarvestError::storage_io(path, e))?;
    tmp.persist(path)
        .map_err(|e| HarvestError::storage_io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};
    use tempfile::TempDir;

    fn sample_item(id: i64, likes: u64) -> Item {
        Item {
            id,
            text: format!("post {}", id),
            author_handle: format!("user{}", id),
            author_display_name: format!("User {}", id),
            created_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            like_count: likes,
            repost_count: 2,
            reply_count: 1,
            view_count: Some(500),
            language: Some("en".to_string()),
            hashtags: vec!["news".to_string(), "today".to_string()],
            is_repost: false,
            parent_id: None,
        }
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn store_in(tmp: &TempDir) -> CheckpointStore {
        CheckpointStore::new(tmp.path().join("run").join("checkpoint.json")).unwrap()
    }

    #[test]
    fn test_new_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(store.path().parent().unwrap().is_dir());
    }

    #[test]
    fn test_start_new_run() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);

        let state = store.start_new_run(&topics(&["a", "b", "c"])).unwrap();
        assert_eq!(state.run_id, today_run_id());
        assert_eq!(state.run_id.len(), 8);
        assert_eq!(state.topics_remaining, topics(&["a", "b", "c"]));
        assert!(state.topics_completed.is_empty());
        assert!(state.collected_items.is_empty());
        assert!(!state.stage1_complete && !state.stage2_complete);
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a", "b"])).unwrap();
        store.complete_stage1().unwrap();

        let mut reopened = store_in(&tmp);
        let loaded = reopened.load().unwrap();
        assert!(loaded.stage1_complete);
        assert_eq!(loaded.topics_remaining, topics(&["a", "b"]));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        assert!(store.load().is_none());
        assert!(!store.should_resume());
    }

    #[test]
    fn test_load_corrupt_file_is_no_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        std::fs::write(store.path(), b"{\"run_id\": \"2026").unwrap();
        assert!(store.load().is_none());
        assert!(!store.should_resume());
    }

    #[test]
    fn test_get_state_before_init() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(matches!(
            store.get_state(),
            Err(HarvestError::InvalidState(_))
        ));
    }

    #[test]
    fn test_mark_topic_complete_with_items() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a", "b"])).unwrap();

        let items = vec![sample_item(1, 5), sample_item(2, 6)];
        let outcome = store.mark_topic_complete("a", &items).unwrap();
        assert_eq!(outcome, TopicOutcome::Completed { items: 2 });

        let state = store.get_state().unwrap();
        assert_eq!(state.topics_completed, topics(&["a"]));
        assert_eq!(state.topics_remaining, topics(&["b"]));
        assert_eq!(state.collected_items.len(), 2);
        assert_eq!(state.collected_items[0].topic.as_deref(), Some("a"));
    }

    #[test]
    fn test_mark_topic_complete_is_idempotent_on_topic_lists() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();

        store.mark_topic_complete("a", &[sample_item(1, 1)]).unwrap();
        store.mark_topic_complete("a", &[sample_item(2, 1)]).unwrap();

        let state = store.get_state().unwrap();
        assert_eq!(state.topics_completed, topics(&["a"]));
        assert!(state.topics_remaining.is_empty());
    }

    #[test]
    fn test_retry_exhaustion() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["quiet", "busy"])).unwrap();

        for attempt in 1..=3 {
            let outcome = store.mark_topic_complete("quiet", &[]).unwrap();
            assert_eq!(outcome, TopicOutcome::RetryScheduled { attempt });
        }
        let state = store.get_state().unwrap();
        assert!(state.topics_remaining.contains(&"quiet".to_string()));
        assert!(!state.topics_completed.contains(&"quiet".to_string()));
        assert_eq!(state.retry_counts.get("quiet"), Some(&3));

        let outcome = store.mark_topic_complete("quiet", &[]).unwrap();
        assert_eq!(outcome, TopicOutcome::Exhausted);
        let state = store.get_state().unwrap();
        assert_eq!(state.topics_completed, topics(&["quiet"]));
        assert_eq!(state.topics_remaining, topics(&["busy"]));
        assert!(state.collected_items.is_empty());
    }

    #[test]
    fn test_retry_progress_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["quiet"])).unwrap();
        store.mark_topic_complete("quiet", &[]).unwrap();

        let mut reopened = store_in(&tmp);
        let state = reopened.load().unwrap();
        assert_eq!(state.retry_counts.get("quiet"), Some(&1));
    }

    #[test]
    fn test_topic_sets_stay_disjoint() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let all = topics(&["a", "b", "c"]);
        store.start_new_run(&all).unwrap();

        store.mark_topic_complete("b", &[sample_item(1, 1)]).unwrap();
        store.mark_topic_complete("c", &[]).unwrap();

        let state = store.get_state().unwrap();
        for t in &state.topics_completed {
            assert!(!state.topics_remaining.contains(t));
        }
        let mut union: Vec<String> = state
            .topics_completed
            .iter()
            .chain(state.topics_remaining.iter())
            .cloned()
            .collect();
        union.sort();
        assert_eq!(union, all);
    }

    #[test]
    fn test_get_collected_items_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a", "b"])).unwrap();

        let mut reply = sample_item(3, 1);
        reply.parent_id = Some(1);
        let mut sparse = sample_item(4, 0);
        sparse.created_at = None;
        sparse.view_count = None;
        sparse.language = None;
        sparse.hashtags.clear();

        let batch = vec![sample_item(1, 9), reply, sparse];
        store.mark_topic_complete("a", &batch).unwrap();

        let mut reopened = store_in(&tmp);
        reopened.load().unwrap();
        assert_eq!(reopened.get_collected_items().unwrap(), batch);
    }

    #[test]
    fn test_older_entries_without_parent_or_topic() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let legacy = serde_json::json!({
            "run_id": today_run_id(),
            "started_at": "2026-03-01T12:00:00Z",
            "stage1_complete": true,
            "topics_completed": ["a"],
            "topics_remaining": [],
            "collected_items": [{
                "id": 123,
                "text": "old post",
                "author_handle": "user",
                "created_at": null,
                "like_count": 10,
                "repost_count": 5,
                "reply_count": 1,
                "is_repost": false
            }]
        });
        std::fs::write(store.path(), legacy.to_string()).unwrap();

        assert!(store.should_resume());
        let items = store.get_collected_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].parent_id, None);
        assert_eq!(items[0].author_display_name, "Unknown");
        assert!(items[0].hashtags.is_empty());

        let groups = store.collected_by_topic().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, UNTAGGED_TOPIC);
    }

    #[test]
    fn test_collected_by_topic_groups_in_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a", "b"])).unwrap();
        store.mark_topic_complete("b", &[sample_item(1, 1)]).unwrap();
        store
            .mark_topic_complete("a", &[sample_item(2, 1), sample_item(3, 1)])
            .unwrap();

        let groups = store.collected_by_topic().unwrap();
        assert_eq!(groups[0].0, "b");
        assert_eq!(groups[0].1.len(), 1);
        assert_eq!(groups[1].0, "a");
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_should_resume_same_day_only() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();
        let today = Local::now().date_naive();

        let mut reopened = store_in(&tmp);
        assert!(reopened.should_resume_on(today));
        assert!(!reopened.should_resume_on(today.checked_add_days(Days::new(1)).unwrap()));
        assert!(!reopened.should_resume_on(today.checked_sub_days(Days::new(1)).unwrap()));
    }

    #[test]
    fn test_should_not_resume_completed_run() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();
        store.complete_stage1().unwrap();
        store.complete_stage2().unwrap();

        let mut reopened = store_in(&tmp);
        assert!(!reopened.should_resume());
    }

    #[test]
    fn test_clear_requires_stage2() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();

        assert!(matches!(store.clear(), Err(HarvestError::InvalidState(_))));
        assert!(store.path().exists());

        store.complete_stage2().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.get_state().is_err());
    }

    #[test]
    fn test_set_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);

        // No state yet: silently ignored.
        store.set_error("too early");
        assert!(!store.path().exists());

        store.start_new_run(&topics(&["a"])).unwrap();
        store.set_error("boom");
        assert_eq!(store.get_state().unwrap().error.as_deref(), Some("boom"));

        let mut reopened = store_in(&tmp);
        assert_eq!(reopened.load().unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();
        store.mark_topic_complete("a", &[sample_item(1, 1)]).unwrap();

        let entries: Vec<_> = std::fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_start_new_run_unwritable_path_keeps_no_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoint.json");
        std::fs::create_dir(&path).unwrap();
        let mut store = CheckpointStore::new(&path).unwrap();

        match store.start_new_run(&topics(&["a", "b"])) {
            Err(HarvestError::StorageIo { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected StorageIo, got {:?}", other.map(|s| s.run_id.clone())),
        }
        assert!(matches!(store.get_state(), Err(HarvestError::InvalidState(_))));
        assert!(!store.should_resume());
        assert!(path.is_dir());
    }

    #[test]
    fn test_failed_start_restores_previous_run() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.start_new_run(&topics(&["a"])).unwrap();
        store
            .mark_topic_complete("a", &[sample_item(1, 5)])
            .unwrap();

        let blocked = tmp.path().join("blocked.json");
        std::fs::create_dir(&blocked).unwrap();
        store.path = blocked;

        assert!(store.start_new_run(&topics(&["x", "y"])).is_err());
        let state = store.get_state().unwrap();
        assert_eq!(state.topics_completed, topics(&["a"]));
        assert_eq!(state.collected_items.len(), 1);
    }
}
