//! Config command - View and validate AttSync configuration
//!
//! Provides the `attsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), with the API token
//!    redacted
//! 2. Validates the configuration file and reports every error
//! 3. Prints the configuration file path
//!
//! Each subcommand runs once per `--config` given.

use anyhow::{Context, Result};
use attsync_core::config::Config;
use clap::Subcommand;
use tracing::info;

use crate::context::CliContext;

const REDACTED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        for project in ctx.projects() {
            match self {
                ConfigCommand::Show => execute_show(&project)?,
                ConfigCommand::Validate => execute_validate(&project)?,
                ConfigCommand::Path => execute_path(&project)?,
            }
        }
        Ok(())
    }
}

/// Copy of `config` safe to print
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if !shown.remote.api_token.is_empty() {
        shown.remote.api_token = REDACTED.to_string();
    }
    shown
}

fn execute_show(ctx: &CliContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config = redacted(&ctx.load_config()?);

    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config_path = &ctx.config_path;

    if !config_path.exists() {
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": false,
                "config_path": config_path.display().to_string(),
                "errors": ["Configuration file not found"],
            }));
        } else {
            formatter.error(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
        }
        return Ok(());
    }

    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(e) => {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("{e:#}")],
                }));
            } else {
                formatter.error(&format!("Failed to load configuration: {e:#}"));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if ctx.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_path(ctx: &CliContext) -> Result<()> {
    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "exists": ctx.config_path.exists(),
        }));
    } else {
        println!("{}", ctx.config_path.display());
    }
    Ok(())
}
