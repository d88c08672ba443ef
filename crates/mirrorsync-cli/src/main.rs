//! MirrorSync CLI - Command-line interface for MirrorSync
//!
//! Provides commands for:
//! - Linking a provider root to a workspace
//! - Running cache passes and large-file backfills
//! - Viewing mirror status
//! - Reporting workspace progress
//! - Managing configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mirrorsync_core::config::Config;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, link::LinkCommand,
    report_progress::ReportProgressCommand, status::StatusCommand, sync::SyncCommand,
    sync_large::SyncLargeCommand, unlink::UnlinkCommand, CommandContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "mirrorsync",
    version,
    about = "Mirror cloud storage roots into workspaces"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Link a provider root to a workspace
    Link(LinkCommand),
    /// Run a cache pass for a linked mirror
    Sync(SyncCommand),
    /// Cache files that a pass skipped for size
    SyncLarge(SyncLargeCommand),
    /// Show mirror status
    Status(StatusCommand),
    /// Remove a mirror and its cached content
    Unlink(UnlinkCommand),
    /// Record progress reported by the workspace
    ReportProgress(ReportProgressCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Explicit paths must load; the default path may be absent
fn load_config(explicit: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    match explicit {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, path))
        }
        None => {
            let path = Config::default_path();
            let config = if path.exists() {
                Config::load(&path).with_context(|| {
                    format!("Failed to load configuration from {}", path.display())
                })?
            } else {
                Config::default()
            };
            Ok((config, path))
        }
    }
}

fn init_tracing(config: &Config, verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => config.logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = OutputFormat::new(cli.json, cli.quiet);

    let (config, config_path) = match load_config(cli.config.clone()) {
        Ok(loaded) => loaded,
        Err(e) => {
            get_formatter(format).error(&format!("{e:#}"));
            std::process::exit(1);
        }
    };
    init_tracing(&config, cli.verbose, cli.quiet);

    let ctx = CommandContext {
        config,
        config_path,
        format,
    };

    let result = match &cli.command {
        Commands::Link(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::SyncLarge(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Unlink(cmd) => cmd.execute(&ctx).await,
        Commands::ReportProgress(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(e) = result {
        ctx.formatter().error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
