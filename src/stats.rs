//! Run history overview.
//!
//! Used by `harvest stats` to show what recent runs collected and whether they
//! finished storing.

use anyhow::Result;

use crate::config::Config;
use crate::store::{ItemStore, SqliteItemStore};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, limit: i64) -> Result<()> {
    let store = SqliteItemStore::connect(&config.db.path).await?;
    let runs = store.list_runs(limit).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Topic Harvest — Run History");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    if runs.is_empty() {
        println!();
        println!("  No runs recorded yet.");
        println!();
        store.close().await;
        return Ok(());
    }

    println!();
    println!(
        "  {:<10} {:>8} {:>8}   {:<18} {}",
        "RUN", "ITEMS", "STORED", "STARTED", "COMPLETED"
    );
    println!("  {}", "-".repeat(69));
    for run in &runs {
        let started = run
            .started_at
            .map(format_ts_iso)
            .unwrap_or_else(|| "-".to_string());
        let (items, completed) = match run.completed_at {
            Some(ts) => (run.item_count.to_string(), format_ts_relative(ts)),
            None => ("-".to_string(), "incomplete".to_string()),
        };
        println!(
            "  {:<10} {:>8} {:>8}   {:<18} {}",
            run.run_id, items, run.live_count, started, completed
        );
    }

    // Per-topic breakdown of the latest run
    let latest = &runs[0];
    let topics = store.topic_counts(&latest.run_id).await?;
    if !topics.is_empty() {
        println!();
        println!("  Latest run {} by topic:", latest.run_id);
        for (topic, count) in &topics {
            println!("    {:<24} {:>8}", topic, count);
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
        assert_eq!(format_ts_iso(0), "1970-01-01 00:00");
    }
}
