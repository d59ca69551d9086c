//! Shared command context: global flags, config loading and engine wiring
//!
//! Several `--config` flags address several projects, each with its own
//! target directory, page and state files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use attsync_core::config::Config;
use attsync_core::ports::{IDocumentRenderer, IRemoteStore};
use attsync_remote::{ConfluenceAttachmentStore, ConfluenceClient, GalleryRenderer};
use attsync_sync::engine::SyncEngine;
use attsync_sync::executor::ConcurrencyLimits;
use attsync_sync::patterns::FilePatterns;
use attsync_sync::retry::RetryPolicy;
use attsync_sync::scanner::LocalScanner;
use attsync_sync::state::StateStore;
use tracing::{debug, warn};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command receives
#[derive(Debug, Clone)]
pub struct CliContext {
    pub format: OutputFormat,
    /// Config of the first (or only) project
    pub config_path: PathBuf,
    /// Every project config, in command-line order
    pub config_paths: Vec<PathBuf>,
    pub quiet: bool,
}

impl CliContext {
    /// With no config paths the default config file is used
    pub fn new(format: OutputFormat, config_paths: Vec<PathBuf>, quiet: bool) -> Self {
        let config_paths = if config_paths.is_empty() {
            vec![Config::default_path()]
        } else {
            config_paths
        };
        Self {
            format,
            config_path: config_paths[0].clone(),
            config_paths,
            quiet,
        }
    }

    /// One context per project config
    pub fn projects(&self) -> Vec<CliContext> {
        self.config_paths
            .iter()
            .map(|path| CliContext::new(self.format, vec![path.clone()], self.quiet))
            .collect()
    }

    pub fn is_multi_project(&self) -> bool {
        self.config_paths.len() > 1
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Load the config file, or defaults when it does not exist
    ///
    /// A file that exists but fails to parse is an error, as is an unset
    /// environment variable referenced from it.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = if self.config_path.exists() {
            Config::load(&self.config_path)?
        } else {
            warn!(path = %self.config_path.display(), "Config file not found, using defaults");
            Config::default()
        };
        expand_paths(&mut config);
        debug!(path = %self.config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// [`load_config`](Self::load_config) followed by validation
    pub fn validated_config(&self) -> Result<Config> {
        let config = self.load_config()?;
        let errors = config.validate();
        if !errors.is_empty() {
            let list: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!(
                "Invalid configuration ({}):\n  {}",
                self.config_path.display(),
                list.join("\n  ")
            );
        }
        Ok(config)
    }

    /// Validated config of every project
    ///
    /// Fails if any project is invalid or two projects share a state file.
    pub fn validated_projects(&self) -> Result<Vec<Config>> {
        let configs = self
            .projects()
            .iter()
            .map(CliContext::validated_config)
            .collect::<Result<Vec<_>>>()?;
        ensure_distinct_state(&configs, &self.config_paths)?;
        Ok(configs)
    }
}

fn ensure_distinct_state(configs: &[Config], config_paths: &[PathBuf]) -> Result<()> {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    for (config, path) in configs.iter().zip(config_paths) {
        if let Some(first) = owners.insert(config.state_path(), path) {
            bail!(
                "{} and {} share the state file {}; give each project its own state.dir",
                first.display(),
                path.display(),
                config.state_path().display()
            );
        }
    }
    Ok(())
}

/// Expand tilde (~) in a path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(stripped) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if s == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

fn expand_paths(config: &mut Config) {
    config.sync.target_dir = expand_tilde(&config.sync.target_dir);
    config.state.dir = expand_tilde(&config.state.dir);
    // Watcher events carry absolute paths
    config.sync.notes_file = config
        .sync
        .notes_file
        .as_deref()
        .map(|path| absolute(&expand_tilde(path)));
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

pub fn state_store(config: &Config) -> StateStore {
    StateStore::new(
        config.state_path(),
        config.history_path(),
        config.state.history_keep,
    )
}

/// Wire the Confluence adapter, gallery renderer and local scanner into
/// a sync engine
pub fn build_engine(config: &Config) -> Result<SyncEngine> {
    let patterns = FilePatterns::new(&config.patterns.include, &config.patterns.exclude)
        .context("Invalid file pattern")?;
    let scanner = LocalScanner::new(
        config.sync.target_dir.clone(),
        patterns,
        config.sync.key_mode,
    );

    let client = ConfluenceClient::new(
        &config.remote.base_url,
        &config.remote.page_id,
        &config.remote.email,
        &config.remote.api_token,
        config.remote.timeout(),
    )
    .context("Failed to create Confluence client")?;
    let remote: Arc<dyn IRemoteStore> = Arc::new(ConfluenceAttachmentStore::new(client));
    let renderer: Arc<dyn IDocumentRenderer> =
        Arc::new(GalleryRenderer::new(config.project.name.clone()));

    let engine = SyncEngine::new(
        remote,
        renderer,
        state_store(config),
        scanner,
        ConcurrencyLimits::from(&config.concurrency),
        RetryPolicy::from_config(&config.retry),
    );
    Ok(match &config.sync.notes_file {
        Some(path) => engine.with_notes(path.clone()),
        None => engine,
    })
}
