//! Reset command - Clear locally persisted state
//!
//! `--cache` removes the state snapshot, forcing the next cycle to list the
//! remote store in full. `--history` removes the sync history. With neither
//! flag both are removed, for every configured project. Remote attachments
//! are never touched.

use anyhow::{Context, Result};
use attsync_sync::state::ClearScope;
use clap::Args;

use crate::context::{state_store, CliContext};

#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Remove the cached state snapshot
    #[arg(long)]
    pub cache: bool,

    /// Remove the sync history
    #[arg(long)]
    pub history: bool,
}

impl ResetCommand {
    pub fn scope(&self) -> ClearScope {
        match (self.cache, self.history) {
            (true, false) => ClearScope::Cache,
            (false, true) => ClearScope::History,
            _ => ClearScope::All,
        }
    }

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
        let scope = self.scope();

        store
            .clear(scope)
            .await
            .context("Failed to clear persisted state")?;

        let what = match scope {
            ClearScope::Cache => "Cached state",
            ClearScope::History => "Sync history",
            ClearScope::All => "Cached state and sync history",
        };
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "project": config.project.name,
                "cleared": format!("{scope:?}").to_lowercase(),
                "state_dir": config.state.dir.display().to_string(),
            }));
        } else {
            formatter.success(&format!("{what} cleared ({})", config.project.name));
            formatter.info(&format!("Directory: {}", config.state.dir.display()));
        }
        Ok(())
    }
}
