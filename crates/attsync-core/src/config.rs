//! Configuration module for AttSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, environment substitution, validation, defaults, and a builder
//! pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for AttSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub patterns: PatternConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Project identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name, used as the document title and the state sub-directory.
    pub name: String,
}

/// Remote attachment store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the wiki, e.g. `https://example.atlassian.net`.
    pub base_url: String,
    /// Page that owns the attachments and the rendered document.
    pub page_id: String,
    /// Account e-mail used for basic authentication.
    pub email: String,
    /// API token; usually given as `${CONFLUENCE_API_TOKEN}`.
    pub api_token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// How asset keys are derived from file paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Bare file name; the remote namespace is flat.
    #[default]
    FileName,
    /// Full path relative to the target directory.
    RelativePath,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory whose assets are mirrored.
    pub target_dir: PathBuf,
    pub key_mode: KeyMode,
    /// Quiet period after the last filesystem event before a cycle runs.
    pub debounce_ms: u64,
    /// Seconds between forced full resyncs in watch mode (0 disables).
    pub full_resync_interval_secs: u64,
    /// Plan only; never mutate remote or persisted state.
    pub dry_run: bool,
    /// YAML map of asset or group name to note text, shown in the document.
    /// Changes to this file re-render the document in watch mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_file: Option<PathBuf>,
}

/// File selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Glob patterns a file must match (any of) to be tracked.
    pub include: Vec<String>,
    /// Glob patterns that exclude an otherwise included file.
    pub exclude: Vec<String>,
}

/// Worker pool sizes, one per operation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub upload: usize,
    pub delete: usize,
    pub download: usize,
}

/// Retry policy for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Add random jitter to each backoff delay.
    pub jitter: bool,
}

/// Persisted state location and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding the state and history files.
    pub dir: PathBuf,
    pub state_file: String,
    pub history_file: String,
    /// Number of history entries to keep.
    pub history_keep: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    ///
    /// `${VAR}` and `$VAR` inside string values are replaced from the
    /// process environment; an unset variable is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from YAML text with a custom variable lookup.
    pub fn from_yaml_str(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let raw: Value = serde_yaml::from_str(content).context("Invalid YAML")?;
        let value = substitute_value(raw, &lookup)?;
        let config = serde_yaml::from_value(value).context("Invalid configuration")?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/attsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("attsync")
            .join("config.yaml")
    }

    /// Full path of the state snapshot file.
    pub fn state_path(&self) -> PathBuf {
        self.state.dir.join(&self.state.state_file)
    }

    /// Full path of the history file.
    pub fn history_path(&self) -> PathBuf {
        self.state.dir.join(&self.state.history_file)
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// `None` when periodic full resyncs are disabled.
    pub fn full_resync_interval(&self) -> Option<Duration> {
        (self.full_resync_interval_secs > 0)
            .then(|| Duration::from_secs(self.full_resync_interval_secs))
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Environment substitution
// ---------------------------------------------------------------------------

fn substitute_value(value: Value, lookup: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(substitute_env(&s, lookup)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|v| substitute_value(v, lookup))
                .collect::<anyhow::Result<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(k, substitute_value(v, lookup)?);
            }
            Value::Mapping(out)
        }
        other => other,
    })
}

/// Expand `${NAME}` and `$NAME` references in `input`.
///
/// A `$` not followed by a name or `{` is kept literally.
pub fn substitute_env(input: &str, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => bail!("Unterminated variable reference in '{input}'"),
            }
        } else {
            let end = after
                .char_indices()
                .find(|&(i, c)| !(c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())))
                .map_or(after.len(), |(i, _)| i);
            (&after[..end], end)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => bail!("Environment variable '{name}' is not set; export {name}=<value>"),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "attsync".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_id: String::new(),
            email: String::new(),
            api_token: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Assets"),
            key_mode: KeyMode::FileName,
            debounce_ms: 3000,
            full_resync_interval_secs: 0,
            dry_run: false,
            notes_file: None,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            include: vec!["*.png".into(), "*.jpg".into(), "*.jpeg".into()],
            exclude: Vec::new(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            upload: 4,
            delete: 1,
            download: 8,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("attsync"),
            state_file: "state.json".to_string(),
            history_file: "history.json".to_string(),
            history_keep: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn required(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be set".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- project ---
        required(&mut errors, "project.name", &self.project.name);

        // --- remote ---
        if !self.remote.base_url.starts_with("http://") && !self.remote.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.remote.base_url),
            });
        }
        required(&mut errors, "remote.page_id", &self.remote.page_id);
        required(&mut errors, "remote.email", &self.remote.email);
        required(&mut errors, "remote.api_token", &self.remote.api_token);
        positive(&mut errors, "remote.timeout_secs", self.remote.timeout_secs);

        // --- sync ---
        positive(&mut errors, "sync.debounce_ms", self.sync.debounce_ms);

        // Check target dir only when it does not start with `~` (tilde is expanded at runtime).
        let dir_str = self.sync.target_dir.to_string_lossy();
        if !dir_str.starts_with('~') && !self.sync.target_dir.is_dir() {
            errors.push(ValidationError {
                field: "sync.target_dir".into(),
                message: format!("directory does not exist: {}", self.sync.target_dir.display()),
            });
        }

        // --- patterns ---
        if self.patterns.include.is_empty() {
            errors.push(ValidationError {
                field: "patterns.include".into(),
                message: "at least one pattern is required".into(),
            });
        }
        for (field, list) in [
            ("patterns.include", &self.patterns.include),
            ("patterns.exclude", &self.patterns.exclude),
        ] {
            for pattern in list {
                if let Err(e) = glob::Pattern::new(pattern) {
                    errors.push(ValidationError {
                        field: field.into(),
                        message: format!("invalid glob '{pattern}': {e}"),
                    });
                }
            }
        }

        // --- concurrency ---
        positive(&mut errors, "concurrency.upload", self.concurrency.upload as u64);
        positive(&mut errors, "concurrency.delete", self.concurrency.delete as u64);
        positive(&mut errors, "concurrency.download", self.concurrency.download as u64);

        // --- retry ---
        positive(&mut errors, "retry.max_attempts", u64::from(self.retry.max_attempts));
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            errors.push(ValidationError {
                field: "retry.multiplier".into(),
                message: "must be at least 1.0".into(),
            });
        }

        // --- state ---
        positive(&mut errors, "state.history_keep", self.state.history_keep as u64);
        required(&mut errors, "state.state_file", &self.state.state_file);
        required(&mut errors, "state.history_file", &self.state.history_file);
        if self.state.state_file == self.state.history_file {
            errors.push(ValidationError {
                field: "state.history_file".into(),
                message: "must differ from state.state_file".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use attsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .target_dir(PathBuf::from("/srv/assets"))
///     .remote("https://wiki.example.com", "12345")
///     .concurrency_upload(2)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- project ---

    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.config.project.name = name.into();
        self
    }

    // --- remote ---

    pub fn remote(mut self, base_url: impl Into<String>, page_id: impl Into<String>) -> Self {
        self.config.remote.base_url = base_url.into();
        self.config.remote.page_id = page_id.into();
        self
    }

    pub fn credentials(mut self, email: impl Into<String>, api_token: impl Into<String>) -> Self {
        self.config.remote.email = email.into();
        self.config.remote.api_token = api_token.into();
        self
    }

    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.timeout_secs = secs;
        self
    }

    // --- sync ---

    pub fn target_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.target_dir = dir;
        self
    }

    pub fn key_mode(mut self, mode: KeyMode) -> Self {
        self.config.sync.key_mode = mode;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.debounce_ms = ms;
        self
    }

    pub fn full_resync_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync.full_resync_interval_secs = secs;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.sync.dry_run = dry_run;
        self
    }

    pub fn notes_file(mut self, path: PathBuf) -> Self {
        self.config.sync.notes_file = Some(path);
        self
    }

    // --- patterns ---

    pub fn include(mut self, patterns: Vec<String>) -> Self {
        self.config.patterns.include = patterns;
        self
    }

    pub fn exclude(mut self, patterns: Vec<String>) -> Self {
        self.config.patterns.exclude = patterns;
        self
    }

    // --- concurrency ---

    pub fn concurrency_upload(mut self, n: usize) -> Self {
        self.config.concurrency.upload = n;
        self
    }

    pub fn concurrency_delete(mut self, n: usize) -> Self {
        self.config.concurrency.delete = n;
        self
    }

    pub fn concurrency_download(mut self, n: usize) -> Self {
        self.config.concurrency.download = n;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry.base_delay_ms = base;
        self.config.retry.max_delay_ms = max;
        self
    }

    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    // --- state ---

    pub fn state_dir(mut self, dir: PathBuf) -> Self {
        self.config.state.dir = dir;
        self
    }

    pub fn history_keep(mut self, n: usize) -> Self {
        self.config.state.history_keep = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn valid_builder(dir: &Path) -> ConfigBuilder {
        ConfigBuilder::new()
            .target_dir(dir.to_path_buf())
            .remote("https://wiki.example.com", "12345")
            .credentials("bot@example.com", "secret")
            .remote_timeout_secs(30)
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.debounce_ms, 3000);
        assert_eq!(cfg.sync.key_mode, KeyMode::FileName);
        assert!(!cfg.sync.dry_run);
        assert_eq!(cfg.patterns.include, vec!["*.png", "*.jpg", "*.jpeg"]);
        assert_eq!(cfg.concurrency.delete, 1);
        assert_eq!(cfg.concurrency.upload, 4);
        assert_eq!(cfg.concurrency.download, 8);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.max_delay(), Duration::from_secs(30));
        assert_eq!(cfg.state.history_keep, 10);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.sync.full_resync_interval().is_none());
    }

    #[test]
    fn default_config_only_misses_remote_settings() {
        let errors = Config::default().validate();
        let unexpected: Vec<_> = errors
            .iter()
            .filter(|e| !e.field.starts_with("remote.") && e.field != "sync.target_dir")
            .collect();
        assert!(unexpected.is_empty(), "unexpected validation errors: {unexpected:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
project:
  name: slot-demo
remote:
  base_url: https://wiki.example.com
  page_id: "98765"
  email: bot@example.com
  api_token: plain-token
  timeout_secs: 20
sync:
  target_dir: /tmp/assets
  key_mode: relative_path
  debounce_ms: 500
  full_resync_interval_secs: 3600
patterns:
  include: ["*.png"]
  exclude: ["*_old.png"]
concurrency:
  upload: 2
  delete: 1
  download: 3
retry:
  max_attempts: 3
  base_delay_ms: 100
  max_delay_ms: 1000
  multiplier: 3.0
  jitter: false
state:
  dir: /tmp/attsync-state
  history_keep: 4
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.project.name, "slot-demo");
        assert_eq!(cfg.remote.page_id, "98765");
        assert_eq!(cfg.remote.timeout(), Duration::from_secs(20));
        assert_eq!(cfg.sync.key_mode, KeyMode::RelativePath);
        assert_eq!(cfg.sync.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.sync.full_resync_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(cfg.patterns.exclude, vec!["*_old.png"]);
        assert_eq!(cfg.concurrency.download, 3);
        assert!(!cfg.retry.jitter);
        assert_eq!(cfg.state_path(), PathBuf::from("/tmp/attsync-state/state.json"));
        assert_eq!(cfg.history_path(), PathBuf::from("/tmp/attsync-state/history.json"));
        assert_eq!(cfg.logging.format, "json");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let cfg = Config::from_yaml_str("sync:\n  debounce_ms: 42\n", env(&[])).unwrap();
        assert_eq!(cfg.sync.debounce_ms, 42);
        assert_eq!(cfg.concurrency.delete, 1);
        assert_eq!(cfg.retry.max_attempts, 5);
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/attsync.yaml")).is_err());
    }

    #[test]
    fn load_or_default_falls_back() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/attsync.yaml"));
        assert_eq!(cfg.sync.debounce_ms, 3000);
    }

    // -- Environment substitution --

    #[test]
    fn substitutes_env_in_string_values() {
        let yaml = "remote:\n  api_token: ${TOKEN}\n  email: $USER_MAIL\n";
        let cfg = Config::from_yaml_str(yaml, env(&[("TOKEN", "t0k"), ("USER_MAIL", "a@b.c")])).unwrap();
        assert_eq!(cfg.remote.api_token, "t0k");
        assert_eq!(cfg.remote.email, "a@b.c");
    }

    #[test]
    fn undefined_env_var_is_an_error() {
        let err = Config::from_yaml_str("remote:\n  api_token: ${MISSING}\n", env(&[])).unwrap_err();
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn substitute_env_edge_cases() {
        let lookup = env(&[("A", "1"), ("B_2", "two")]);
        assert_eq!(substitute_env("x-$A-y", &lookup).unwrap(), "x-1-y");
        assert_eq!(substitute_env("${B_2}${A}", &lookup).unwrap(), "two1");
        assert_eq!(substitute_env("cost $ 5", &lookup).unwrap(), "cost $ 5");
        assert_eq!(substitute_env("no vars", &lookup).unwrap(), "no vars");
        assert!(substitute_env("${A", &lookup).is_err());
    }

    // -- Validation --

    #[test]
    fn valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = valid_builder(dir.path()).build_validated();
        assert!(cfg.is_ok(), "{:?}", cfg.err());
    }

    #[test]
    fn validation_catches_zero_limits() {
        let dir = tempfile::tempdir().unwrap();
        let errors = valid_builder(dir.path())
            .concurrency_upload(0)
            .concurrency_delete(0)
            .concurrency_download(0)
            .retry_max_attempts(0)
            .history_keep(0)
            .debounce_ms(0)
            .build()
            .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"concurrency.upload"));
        assert!(fields.contains(&"concurrency.delete"));
        assert!(fields.contains(&"concurrency.download"));
        assert!(fields.contains(&"retry.max_attempts"));
        assert!(fields.contains(&"state.history_keep"));
        assert!(fields.contains(&"sync.debounce_ms"));
    }

    #[test]
    fn validation_catches_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let errors = valid_builder(dir.path())
            .retry_delays_ms(5000, 100)
            .include(vec!["[".to_string()])
            .logging_level("loud")
            .logging_format("xml")
            .build()
            .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"retry.base_delay_ms"));
        assert!(fields.contains(&"patterns.include"));
        assert!(fields.contains(&"logging.level"));
        assert!(fields.contains(&"logging.format"));
    }

    #[test]
    fn validation_rejects_missing_target_dir() {
        let errors = valid_builder(Path::new("/definitely/not/here"))
            .build()
            .validate();
        assert!(errors.iter().any(|e| e.field == "sync.target_dir"));
    }

    #[test]
    fn notes_file_is_optional_and_round_trips() {
        let cfg = Config::default();
        assert!(cfg.sync.notes_file.is_none());
        assert!(!serde_yaml::to_string(&cfg).unwrap().contains("notes_file"));

        let dir = tempfile::tempdir().unwrap();
        let cfg = valid_builder(dir.path())
            .notes_file(PathBuf::from("/assets/notes.yaml"))
            .build();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.sync.notes_file.as_deref(),
            Some(Path::new("/assets/notes.yaml"))
        );
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "retry.max_attempts".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "retry.max_attempts: must be greater than 0");
    }
}
