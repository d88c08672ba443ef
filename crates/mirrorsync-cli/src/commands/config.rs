//! Config command - View and manage MirrorSync configuration
//!
//! Provides the `mirrorsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use mirrorsync_core::config::{Config, ProviderEndpointConfig, StoreBackend};
use mirrorsync_core::domain::Provider;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.lease_ttl_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.format.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(&self, ctx: &CommandContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.config.clone();

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for line in SUPPORTED_KEYS {
                    formatter.info(line);
                }
            }
            anyhow::bail!("Invalid configuration key or value");
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    messages.join("; ")
                ));
            }
            anyhow::bail!("Configuration would be invalid");
        }

        if let Some(parent) = ctx.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        let config = if path.exists() {
            match Config::load(path) {
                Ok(config) => config,
                Err(e) => {
                    if ctx.format.is_json() {
                        formatter.print_json(&serde_json::json!({
                            "valid": false,
                            "config_path": path.display().to_string(),
                            "errors": [format!("Failed to parse configuration: {:#}", e)],
                        }));
                    } else {
                        formatter.error(&format!("Failed to parse configuration: {:#}", e));
                        formatter.info(&format!("File: {}", path.display()));
                    }
                    anyhow::bail!("Configuration file is not valid YAML");
                }
            }
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}; validating defaults",
                path.display()
            ));
            Config::default()
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.format.is_json() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                crate::output::plural(errors.len() as u64)
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Configuration has errors")
        }
    }
}

const SUPPORTED_KEYS: &[&str] = &[
    "  store.root                          - Blob store directory",
    "  store.backend                       - filesystem|memory",
    "  database.path                       - SQLite database file",
    "  sync.large_file_threshold_bytes     - Files at or above are skipped",
    "  sync.buffer_threshold_bytes         - Single-put limit",
    "  sync.part_size_bytes                - Multipart part size",
    "  sync.verify_cached_blobs            - true|false",
    "  sync.lease_ttl_secs                 - Pass lease lifetime",
    "  providers.<name>.base_url           - API base URL",
    "  providers.<name>.content_base_url   - Download host (dropbox)",
    "  providers.<name>.token_env          - Env var holding the token",
    "  replication.endpoint                - Workspace service URL, or none",
    "  replication.token_env               - Env var holding its token",
    "  replication.timeout_secs            - Request timeout",
    "  logging.level                       - trace|debug|info|warn|error",
    "  logging.json                        - true|false",
];

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("Expected a positive integer for {key}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {key}"))
}

fn provider_endpoint<'a>(
    config: &'a mut Config,
    name: &str,
) -> Result<&'a mut ProviderEndpointConfig> {
    let provider: Provider = name.parse()?;
    Ok(match provider {
        Provider::GoogleDrive => &mut config.providers.google_drive,
        Provider::OneDrive => &mut config.providers.onedrive,
        Provider::Dropbox => &mut config.providers.dropbox,
        Provider::GitHub => &mut config.providers.github,
    })
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- store ---
        "store.root" => config.store.root = PathBuf::from(value),
        "store.backend" => {
            config.store.backend = match value {
                "filesystem" => StoreBackend::Filesystem,
                "memory" => StoreBackend::Memory,
                other => anyhow::bail!("Unknown store backend '{other}'"),
            }
        }

        // --- database ---
        "database.path" => config.database.path = PathBuf::from(value),

        // --- sync ---
        "sync.large_file_threshold_bytes" => {
            config.sync.large_file_threshold_bytes = parse_u64(key, value)?
        }
        "sync.buffer_threshold_bytes" => config.sync.buffer_threshold_bytes = parse_u64(key, value)?,
        "sync.part_size_bytes" => config.sync.part_size_bytes = parse_u64(key, value)?,
        "sync.verify_cached_blobs" => config.sync.verify_cached_blobs = parse_bool(key, value)?,
        "sync.lease_ttl_secs" => config.sync.lease_ttl_secs = parse_u64(key, value)?,

        // --- replication ---
        "replication.endpoint" => {
            config.replication.endpoint = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "replication.token_env" => config.replication.token_env = value.to_string(),
        "replication.timeout_secs" => config.replication.timeout_secs = parse_u64(key, value)?,

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse_bool(key, value)?,

        // --- providers.<name>.<field> ---
        other => {
            let parts: Vec<&str> = other.split('.').collect();
            match parts.as_slice() {
                ["providers", name, field] => {
                    let endpoint = provider_endpoint(config, name)?;
                    match *field {
                        "base_url" => endpoint.base_url = value.to_string(),
                        "content_base_url" => {
                            endpoint.content_base_url = if value.is_empty() || value == "none" {
                                None
                            } else {
                                Some(value.to_string())
                            };
                        }
                        "token_env" => endpoint.token_env = value.to_string(),
                        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
                    }
                }
                _ => anyhow::bail!("Unknown configuration key: '{}'", key),
            }
        }
    }

    Ok(())
}
