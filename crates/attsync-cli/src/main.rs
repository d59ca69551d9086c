//! AttSync CLI - Mirror a local asset directory to a Confluence page
//!
//! Provides commands for:
//! - Running one reconciliation cycle
//! - Watching the directory and syncing on change
//! - Inspecting persisted state and history
//! - Viewing and validating configuration
//!
//! Repeating `--config` runs every command once per project.

use std::path::PathBuf;

use anyhow::Result;
use attsync_core::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, reset::ResetCommand,
    status::StatusCommand, sync::SyncCommand, watch::WatchCommand,
};
use context::CliContext;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "attsync",
    version,
    about = "Keep Confluence page attachments in sync with a local directory"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file; repeat to manage several projects
    #[arg(long, global = true, action = clap::ArgAction::Append)]
    config: Vec<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one sync cycle
    Sync(SyncCommand),
    /// Watch the target directory and sync on change
    Watch(WatchCommand),
    /// Show cached state and recent history
    Status(StatusCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Clear locally persisted state
    Reset(ResetCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Level used when neither `RUST_LOG` nor `-v` is given
fn default_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, config_path: &std::path::Path) {
    // Only logging settings are needed here; errors resurface when the
    // command loads the config itself
    let logging = Config::load(config_path)
        .map(|c| c.logging)
        .unwrap_or_default();

    let level = default_level(cli.verbose, &logging.level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.log_json || logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext::new(format, cli.config.clone(), cli.quiet);
    // Logging settings come from the first project
    init_tracing(&cli, &ctx.config_path);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Watch(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Reset(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}
