//! Sync command - Run one reconciliation cycle
//!
//! Provides the `attsync sync` CLI command which:
//! 1. Loads and validates configuration
//! 2. Wires the Confluence adapter, renderer and scanner into a SyncEngine
//! 3. Runs a single cycle (full with `--full`, planning only with `--dry-run`)
//! 4. Displays the cycle report
//!
//! With several projects each gets its own cycle, one after another or all
//! at once with `--parallel`. A failing project does not stop the others.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use attsync_core::config::Config;
use attsync_core::domain::AssetKey;
use attsync_sync::engine::{SyncReport, SyncTrigger};
use attsync_sync::executor::Outcome;
use clap::Args;
use tokio::task::JoinSet;
use tracing::{info, info_span, Instrument};

use crate::context::{build_engine, CliContext};
use crate::output::{format_duration_ms, OutputFormatter};

/// Keys listed per diff set in a dry run
const DRY_RUN_PREVIEW: usize = 10;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// List the whole remote store instead of trusting the cached state
    #[arg(long)]
    pub full: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Sync all projects at once instead of one after another
    #[arg(long)]
    pub parallel: bool,
}

/// Project name and the outcome of its cycle
type ProjectResult = (String, Result<SyncReport>);

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let configs = ctx.validated_projects()?;
        let total = configs.len();

        info!(full = self.full, projects = total, parallel = self.parallel, "Starting sync");
        formatter.info("Starting synchronization...");

        let results = if self.parallel && total > 1 {
            run_parallel(self.full, self.dry_run, configs).await?
        } else {
            let mut results = Vec::with_capacity(total);
            for config in configs {
                results.push(run_project(self.full, self.dry_run, config).await);
            }
            results
        };

        if !ctx.is_multi_project() {
            if let Some((_, result)) = results.into_iter().next() {
                let report = result?;
                print_outcome(ctx, &*formatter, None, &report)?;
            }
            return Ok(());
        }

        let mut failed = 0;
        for (name, result) in results {
            match result {
                Ok(report) => print_outcome(ctx, &*formatter, Some(&name), &report)?,
                Err(e) => {
                    failed += 1;
                    if ctx.is_json() {
                        formatter.print_json(&serde_json::json!({
                            "project": name,
                            "error": format!("{e:#}"),
                        }));
                    } else {
                        formatter.error(&format!("[{name}] {e:#}"));
                    }
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {total} project(s) failed to sync");
        }
        Ok(())
    }
}

fn trigger_for(full: bool, dry_run: bool) -> SyncTrigger {
    let trigger = if full {
        SyncTrigger::full("manual (full)")
    } else {
        SyncTrigger::incremental("manual")
    };
    trigger.dry_run(dry_run)
}

/// One cycle for one project, logged under a `project` span
async fn run_project(full: bool, dry_run: bool, config: Config) -> ProjectResult {
    let name = config.project.name.clone();
    let span = info_span!("project", name = %name);
    let result = async {
        let engine = build_engine(&config)?;
        let trigger = trigger_for(full, dry_run || config.sync.dry_run);
        engine.run_once(trigger).await.context("Sync failed")
    }
    .instrument(span)
    .await;
    (name, result)
}

/// Run every project concurrently, returning results in config order
async fn run_parallel(
    full: bool,
    dry_run: bool,
    configs: Vec<Config>,
) -> Result<Vec<ProjectResult>> {
    let mut tasks = JoinSet::new();
    let mut slots: Vec<Option<ProjectResult>> = configs.iter().map(|_| None).collect();
    for (index, config) in configs.into_iter().enumerate() {
        tasks.spawn(async move { (index, run_project(full, dry_run, config).await) });
    }
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.context("Project sync task failed")?;
        slots[index] = Some(result);
    }
    Ok(slots.into_iter().flatten().collect())
}

fn print_outcome(
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    project: Option<&str>,
    report: &SyncReport,
) -> Result<()> {
    if ctx.is_json() {
        let report = serde_json::to_value(report).context("Failed to serialize sync report")?;
        let json = match project {
            Some(name) => serde_json::json!({ "project": name, "report": report }),
            None => report,
        };
        formatter.print_json(&json);
    } else {
        if let Some(name) = project {
            formatter.info(&format!("[{name}]"));
        }
        print_report(report, formatter);
    }
    Ok(())
}

/// Human-readable cycle report, shared with `watch`
pub fn print_report(report: &SyncReport, formatter: &dyn OutputFormatter) {
    let duration = format_duration_ms(report.duration_ms);

    if report.dry_run {
        formatter.success(&format!(
            "Dry run: {} ({duration}), no changes made",
            report.diff.summary()
        ));
        print_preview(formatter, "add", &report.diff.to_add);
        print_preview(formatter, "update", &report.diff.to_update);
        print_preview(formatter, "delete", &report.diff.to_delete);
    } else if !report.diff.has_changes() && !report.committed {
        formatter.success(&format!("Already in sync ({duration})"));
    } else {
        formatter.success(&format!("Sync completed in {duration}"));
        formatter.info(&format!("Added:   {}", report.added));
        formatter.info(&format!("Updated: {}", report.updated));
        formatter.info(&format!("Deleted: {}", report.deleted));
        if report.failed > 0 {
            formatter.info(&format!("Failed:  {}", report.failed));
        }
        if report.skipped > 0 {
            formatter.info(&format!("Skipped: {}", report.skipped));
        }
    }

    for item in &report.outcomes {
        match &item.outcome {
            Outcome::Failed { attempts, error } => formatter.warn(&format!(
                "{} {} failed after {attempts} attempt(s): {error}",
                item.kind, item.key
            )),
            Outcome::Skipped { reason } => {
                formatter.warn(&format!("{} {} skipped: {reason}", item.kind, item.key))
            }
            Outcome::Succeeded { .. } => {}
        }
    }
    for error in report.scan_errors.iter().chain(&report.errors) {
        formatter.warn(error);
    }
    if let Some(error) = &report.render_error {
        formatter.warn(&format!("Page not updated: {error}"));
    }
}

fn print_preview(formatter: &dyn OutputFormatter, label: &str, keys: &BTreeSet<AssetKey>) {
    if keys.is_empty() {
        return;
    }
    formatter.info(&format!("Would {label} {}:", keys.len()));
    for key in keys.iter().take(DRY_RUN_PREVIEW) {
        formatter.info(&format!("  {key}"));
    }
    if keys.len() > DRY_RUN_PREVIEW {
        formatter.info(&format!("  ... and {} more", keys.len() - DRY_RUN_PREVIEW));
    }
}
