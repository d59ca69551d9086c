//! Watch command - Keep the page in sync while the directory changes
//!
//! Runs a full startup cycle, then feeds filesystem events through the
//! debouncing notifier into the engine until SIGINT or SIGTERM. When
//! `sync.full_resync_interval_secs` is set, a full cycle also runs on that
//! interval to repair drift made outside this tool. Edits to the notes file
//! re-render the page.
//!
//! Every project gets its own engine, watcher and notifier. With several
//! projects, one whose startup fails is skipped and the rest keep running.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use attsync_core::config::Config;
use attsync_sync::engine::{SyncEngine, SyncTrigger};
use attsync_sync::notifier::{ChangeHandler, ChangeNotifier};
use attsync_sync::watcher::FileWatcher;
use clap::Args;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::commands::sync::print_report;
use crate::context::{build_engine, CliContext};
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Skip the full cycle at startup
    #[arg(long)]
    pub no_initial_sync: bool,
}

/// A project being watched; dropping `watcher` stops its events
struct WatchedProject {
    name: String,
    engine: Arc<SyncEngine>,
    watcher: FileWatcher,
    notifier: JoinHandle<()>,
    resync: Option<JoinHandle<()>>,
}

impl WatchCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let configs = ctx.validated_projects()?;

        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_signal(shutdown.clone()));

        let mut running = Vec::with_capacity(configs.len());
        for config in configs {
            let name = config.project.name.clone();
            let started = self
                .start_project(config, &*formatter, shutdown.clone())
                .instrument(info_span!("project", name = %name))
                .await;
            match started {
                Ok(project) => running.push(project),
                Err(e) if ctx.is_multi_project() => {
                    warn!(project = %name, error = %e, "Skipping project");
                    formatter.warn(&format!("[{name}] skipped: {e:#}"));
                }
                Err(e) => return Err(e),
            }
        }
        if running.is_empty() {
            bail!("No project could be started");
        }

        shutdown.cancelled().await;
        formatter.info("Shutting down...");

        for project in running {
            stop_project(project, &*formatter).await;
        }
        Ok(())
    }

    async fn start_project(
        &self,
        config: Config,
        formatter: &dyn OutputFormatter,
        shutdown: CancellationToken,
    ) -> Result<WatchedProject> {
        let name = config.project.name.clone();
        let engine = Arc::new(build_engine(&config)?.with_shutdown(shutdown.clone()));
        let target_dir = config.sync.target_dir.clone();

        if !self.no_initial_sync {
            formatter.info(&format!("[{name}] Running startup sync..."));
            let trigger = SyncTrigger::full("startup").dry_run(config.sync.dry_run);
            if let Some(report) = engine
                .trigger(trigger)
                .await
                .context("Startup sync failed")?
            {
                print_report(&report, formatter);
            }
        }

        let filter_engine = Arc::clone(&engine);
        let (mut watcher, events) = FileWatcher::new(move |path: &Path| {
            filter_engine.scanner().is_tracked(path) || filter_engine.is_notes_file(path)
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(&target_dir)
            .with_context(|| format!("Failed to watch {}", target_dir.display()))?;
        if let Some(notes) = &config.sync.notes_file {
            if let Err(e) = watcher.watch_file(notes) {
                warn!(path = %notes.display(), error = %e, "Notes file will not be watched");
            }
        }

        let notifier = ChangeNotifier::new(config.sync.debounce());
        let handler: Arc<dyn ChangeHandler> = engine.clone();
        let span = info_span!("project", name = %name);
        let notifier = tokio::spawn(
            notifier
                .run(events, handler, shutdown.clone())
                .instrument(span.clone()),
        );

        let resync = config.sync.full_resync_interval().map(|every| {
            tokio::spawn(
                periodic_resync(Arc::clone(&engine), every, config.sync.dry_run, shutdown)
                    .instrument(span),
            )
        });

        formatter.success(&format!("[{name}] Watching {}", target_dir.display()));
        Ok(WatchedProject {
            name,
            engine,
            watcher,
            notifier,
            resync,
        })
    }
}

async fn stop_project(project: WatchedProject, formatter: &dyn OutputFormatter) {
    let WatchedProject {
        name,
        engine,
        watcher,
        notifier,
        resync,
    } = project;

    drop(watcher);
    if let Err(e) = notifier.await {
        error!(project = %name, error = %e, "Change notifier task failed");
    }
    if let Some(task) = resync {
        if let Err(e) = task.await {
            error!(project = %name, error = %e, "Resync task failed");
        }
    }
    if let Some(dropped) = engine.queued_trigger() {
        info!(project = %name, reason = %dropped.reason, "Queued cycle dropped at shutdown");
    }
    formatter.success(&format!("[{name}] Stopped after {} cycle(s)", engine.cycle_count()));
}

async fn periodic_resync(
    engine: Arc<SyncEngine>,
    every: std::time::Duration,
    dry_run: bool,
    shutdown: CancellationToken,
) {
    info!(interval_secs = every.as_secs(), "Periodic full resync enabled");
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; the startup cycle covers it
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let trigger = SyncTrigger::full("periodic resync").dry_run(dry_run);
                if let Err(e) = engine.trigger(trigger).await {
                    error!(error = %e, "Periodic resync failed");
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}
