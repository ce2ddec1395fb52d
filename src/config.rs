use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarvestError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".run/pipeline_checkpoint.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    /// Bearer token for the pool gateway. Only read from `HARVEST_SOURCE_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_source_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapingConfig {
    #[serde(default = "default_per_topic_limit")]
    pub per_topic_limit: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_top_items_for_replies")]
    pub top_items_for_replies: usize,
    #[serde(default = "default_replies_per_item")]
    pub replies_per_item: usize,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            per_topic_limit: default_per_topic_limit(),
            search_timeout_secs: default_search_timeout_secs(),
            top_items_for_replies: default_top_items_for_replies(),
            replies_per_item: default_replies_per_item(),
        }
    }
}

fn default_per_topic_limit() -> usize {
    200
}
fn default_search_timeout_secs() -> u64 {
    120
}
fn default_top_items_for_replies() -> usize {
    10
}
fn default_replies_per_item() -> usize {
    20
}

impl ScrapingConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

/// Delays and bounds that keep the identity pool healthy. All values in seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_max_batch_workers")]
    pub max_batch_workers: usize,
    #[serde(default = "default_jitter_min")]
    pub initial_jitter_min_secs: f64,
    #[serde(default = "default_jitter_max")]
    pub initial_jitter_max_secs: f64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_pause_min")]
    pub page_pause_min_secs: f64,
    #[serde(default = "default_page_pause_max")]
    pub page_pause_max_secs: f64,
    #[serde(default = "default_batch_cooldown")]
    pub batch_cooldown_secs: f64,
    #[serde(default = "default_reply_gap_min")]
    pub reply_gap_min_secs: f64,
    #[serde(default = "default_reply_gap_max")]
    pub reply_gap_max_secs: f64,
    #[serde(default = "default_search_safety_timeout")]
    pub search_safety_timeout_secs: u64,
    #[serde(default = "default_reply_safety_timeout")]
    pub reply_safety_timeout_secs: u64,
    #[serde(default = "default_rate_limit_recovery")]
    pub rate_limit_recovery_secs: u64,
    #[serde(default = "default_recovery_buffer")]
    pub recovery_buffer_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_batch_workers: default_max_batch_workers(),
            initial_jitter_min_secs: default_jitter_min(),
            initial_jitter_max_secs: default_jitter_max(),
            page_size: default_page_size(),
            page_pause_min_secs: default_page_pause_min(),
            page_pause_max_secs: default_page_pause_max(),
            batch_cooldown_secs: default_batch_cooldown(),
            reply_gap_min_secs: default_reply_gap_min(),
            reply_gap_max_secs: default_reply_gap_max(),
            search_safety_timeout_secs: default_search_safety_timeout(),
            reply_safety_timeout_secs: default_reply_safety_timeout(),
            rate_limit_recovery_secs: default_rate_limit_recovery(),
            recovery_buffer_secs: default_recovery_buffer(),
        }
    }
}

fn default_max_batch_workers() -> usize {
    2
}
fn default_jitter_min() -> f64 {
    1.0
}
fn default_jitter_max() -> f64 {
    5.0
}
fn default_page_size() -> usize {
    15
}
fn default_page_pause_min() -> f64 {
    10.0
}
fn default_page_pause_max() -> f64 {
    15.0
}
fn default_batch_cooldown() -> f64 {
    5.0
}
fn default_reply_gap_min() -> f64 {
    5.0
}
fn default_reply_gap_max() -> f64 {
    10.0
}
fn default_search_safety_timeout() -> u64 {
    1200
}
fn default_reply_safety_timeout() -> u64 {
    600
}
fn default_rate_limit_recovery() -> u64 {
    900
}
fn default_recovery_buffer() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Check every required setting. Fails closed on the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.db.path.as_os_str().is_empty() {
            return Err(config_err("db.path must be set (or HARVEST_DB_PATH)"));
        }
        if self.checkpoint.path.as_os_str().is_empty() {
            return Err(config_err("checkpoint.path must not be empty"));
        }

        reqwest::Url::parse(&self.source.base_url).map_err(|e| {
            config_err(format!(
                "source.base_url '{}' is not a valid URL: {}",
                self.source.base_url, e
            ))
        })?;
        if self.source.language.trim().is_empty() {
            return Err(config_err("source.language must not be empty"));
        }

        if self.topics.is_empty() {
            return Err(config_err("topics must list at least one search topic"));
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.trim().is_empty() {
                return Err(config_err("topics must not contain empty entries"));
            }
            if !seen.insert(topic.as_str()) {
                return Err(config_err(format!("duplicate topic: '{}'", topic)));
            }
        }

        if self.scraping.per_topic_limit == 0 {
            return Err(config_err("scraping.per_topic_limit must be > 0"));
        }

        let p = &self.pacing;
        if p.max_batch_workers == 0 {
            return Err(config_err("pacing.max_batch_workers must be >= 1"));
        }
        if p.page_size == 0 {
            return Err(config_err("pacing.page_size must be >= 1"));
        }
        for (name, min, max) in [
            ("initial_jitter", p.initial_jitter_min_secs, p.initial_jitter_max_secs),
            ("page_pause", p.page_pause_min_secs, p.page_pause_max_secs),
            ("reply_gap", p.reply_gap_min_secs, p.reply_gap_max_secs),
        ] {
            check_delay(&format!("pacing.{name}_min_secs"), min)?;
            check_delay(&format!("pacing.{name}_max_secs"), max)?;
            if max < min {
                return Err(config_err(format!(
                    "pacing.{name}_min_secs/{name}_max_secs must satisfy min <= max"
                )));
            }
        }
        check_delay("pacing.batch_cooldown_secs", p.batch_cooldown_secs)?;

        for (name, secs) in [
            ("source.timeout_secs", self.source.timeout_secs),
            ("scraping.search_timeout_secs", self.scraping.search_timeout_secs),
            ("pacing.search_safety_timeout_secs", p.search_safety_timeout_secs),
            ("pacing.reply_safety_timeout_secs", p.reply_safety_timeout_secs),
            ("pacing.rate_limit_recovery_secs", p.rate_limit_recovery_secs),
            ("pacing.recovery_buffer_secs", p.recovery_buffer_secs),
        ] {
            if secs > MAX_TIMEOUT_SECS {
                return Err(config_err(format!(
                    "{name} must be <= {MAX_TIMEOUT_SECS} (got {secs})"
                )));
            }
        }

        Ok(())
    }

    /// Apply `HARVEST_*` environment overrides on top of the file values.
    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("HARVEST_DB_PATH") {
            self.db.path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("HARVEST_SOURCE_URL") {
            self.source.base_url = url;
        }
        self.source.token = std::env::var("HARVEST_SOURCE_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
    }
}

/// Upper bound for any single pacing delay.
pub const MAX_DELAY_SECS: f64 = 3_600.0;

/// Upper bound for any timeout or recovery window.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 86_400;

fn check_delay(name: &str, secs: f64) -> Result<()> {
    if !secs.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&secs) {
        return Err(config_err(format!(
            "{name} must be a number of seconds between 0 and {MAX_DELAY_SECS} (got {secs})"
        )));
    }
    Ok(())
}

fn config_err(msg: impl Into<String>) -> HarvestError {
    HarvestError::Config(msg.into())
}

/// Parse a config from TOML text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| config_err(format!("Failed to parse config file: {}", e)))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let _ = dotenvy::dotenv();

    let content = std::fs::read_to_string(path).map_err(|e| {
        config_err(format!(
            "Failed to read config file {}: {} (copy config/harvest.example.toml to get started)",
            path.display(),
            e
        ))
    })?;

    let mut config = parse_config(&content)?;
    config.apply_env();
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
topics = ["rust", "tokio"]

[db]
path = "./data/harvest.sqlite"

[source]
base_url = "http://127.0.0.1:8700"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.language, "en");
        assert_eq!(config.scraping.per_topic_limit, 200);
        assert_eq!(config.scraping.search_timeout_secs, 120);
        assert_eq!(config.scraping.top_items_for_replies, 10);
        assert_eq!(config.scraping.replies_per_item, 20);
        assert_eq!(config.pacing.max_batch_workers, 2);
        assert_eq!(config.pacing.page_size, 15);
        assert_eq!(config.pacing.search_safety_timeout_secs, 1200);
        assert_eq!(config.pacing.reply_safety_timeout_secs, 600);
        assert_eq!(config.pacing.rate_limit_recovery_secs, 900);
        assert_eq!(
            config.checkpoint.path,
            PathBuf::from(".run/pipeline_checkpoint.json")
        );
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_missing_source_section_fails_parse() {
        let err = parse_config("topics = [\"a\"]\n[db]\npath = \"x\"\n").unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_empty_topics_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.topics.clear();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_duplicate_topics_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.topics.push("rust".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate topic"));
    }

    #[test]
    fn test_bad_url_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.source.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_inverted_delay_range_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.pacing.page_pause_min_secs = 20.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_pause"));
    }

    #[test]
    fn test_non_finite_or_huge_delays_rejected() {
        for value in ["inf", "nan", "1e300", "-1.0"] {
            let content = format!("{MINIMAL}\n[pacing]\nbatch_cooldown_secs = {value}\n");
            let config = parse_config(&content).unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("batch_cooldown_secs"),
                "{value}: {err}"
            );
        }

        let content = format!("{MINIMAL}\n[pacing]\npage_pause_max_secs = inf\n");
        assert!(parse_config(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_huge_timeout_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.pacing.search_safety_timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search_safety_timeout_secs"));

        let mut config = parse_config(MINIMAL).unwrap();
        config.scraping.search_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_workers_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.pacing.max_batch_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/harvest.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.topics.len(), 3);
        assert!(config.source.token.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/harvest.toml")).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
