//! `harvest status`: show the checkpoint of the current or interrupted run.

use anyhow::Result;

use crate::checkpoint::{today_run_id, CheckpointStore, PipelineState};
use crate::config::Config;

pub fn run_status(config: &Config) -> Result<()> {
    let path = &config.checkpoint.path;
    if !path.exists() {
        println!("No checkpoint at {} (next run starts fresh).", path.display());
        return Ok(());
    }

    let mut store = CheckpointStore::new(path)?;
    let Some(state) = store.load() else {
        println!(
            "Checkpoint at {} is unreadable and will be ignored (next run starts fresh).",
            path.display()
        );
        return Ok(());
    };

    print!("{}", render(state, &today_run_id()));
    Ok(())
}

fn render(state: &PipelineState, today: &str) -> String {
    let mut out = String::new();
    let resumable = state.run_id == today && !state.stage2_complete;

    out.push_str("Pipeline checkpoint\n");
    out.push_str("===================\n\n");
    out.push_str(&format!("  Run:         {}\n", state.run_id));
    out.push_str(&format!(
        "  Started:     {}\n",
        state.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "  Updated:     {}\n",
        state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "  Fetch:       {}\n",
        if state.stage1_complete {
            "DONE".to_string()
        } else {
            format!(
                "{}/{} topics",
                state.topics_completed.len(),
                state.topic_count()
            )
        }
    ));
    out.push_str(&format!(
        "  Store:       {}\n",
        if state.stage2_complete { "DONE" } else { "PENDING" }
    ));
    out.push_str(&format!("  Items:       {}\n", state.collected_items.len()));
    out.push_str(&format!(
        "  Resumable:   {}\n",
        if resumable { "yes" } else { "no (next run starts fresh)" }
    ));

    if !state.topics_remaining.is_empty() {
        out.push_str(&format!(
            "\n  Remaining:   {}\n",
            state.topics_remaining.join(", ")
        ));
    }

    if !state.retry_counts.is_empty() {
        out.push_str("\n  Retries:\n");
        for (topic, count) in &state.retry_counts {
            out.push_str(&format!("    {:<24} {}\n", topic, count));
        }
    }

    if let Some(err) = &state.error {
        out.push_str(&format!("\n  Last error:  {}\n", err));
    }

    out
}
