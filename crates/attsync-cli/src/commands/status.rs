//! Status command - Display persisted sync state
//!
//! Shows the cached asset count, the state version and the most recent
//! history entries, newest first, for each project. Reads local files only.

use anyhow::{Context, Result};
use attsync_core::domain::HistoryEntry;
use clap::Args;

use crate::context::{state_store, CliContext};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Number of history entries to show
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        for project in ctx.projects() {
            self.execute_project(&project).await?;
        }
        Ok(())
    }

    async fn execute_project(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let store = state_store(&config);

        let persisted = store
            .load()
            .await
            .context("Failed to read persisted state")?;
        let recent = newest_first(persisted.history, self.limit);
        let snapshot = &persisted.snapshot;

        if ctx.is_json() {
            let json = serde_json::json!({
                "project": config.project.name,
                "target_dir": config.sync.target_dir.display().to_string(),
                "state_file": store.state_path().display().to_string(),
                "initialized": persisted.exists,
                "version": snapshot.version,
                "assets": snapshot.assets.len(),
                "remote_ids": snapshot.ids.len(),
                "history": recent,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if !persisted.exists {
            formatter.warn("No sync state yet. Run 'attsync sync' first.");
            formatter.info(&format!("State file: {}", store.state_path().display()));
            return Ok(());
        }

        formatter.success(&format!("{} (state version {})", config.project.name, snapshot.version));
        formatter.info(&format!("Target:  {}", config.sync.target_dir.display()));
        formatter.info(&format!("Assets:  {}", snapshot.assets.len()));
        formatter.info(&format!("State:   {}", store.state_path().display()));

        if recent.is_empty() {
            formatter.info("History: none");
        } else {
            formatter.info("");
            formatter.info("Recent cycles:");
            for entry in &recent {
                formatter.info(&format!(
                    "  {}  {:<28} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.describe(),
                    entry.reason
                ));
            }
        }
        Ok(())
    }
}

/// Stored history is oldest first; display is newest first
fn newest_first(history: Vec<HistoryEntry>, limit: usize) -> Vec<HistoryEntry> {
    history.into_iter().rev().take(limit).collect()
}
