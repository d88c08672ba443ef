//! CLI subcommands and the wiring they share
//!
//! Every command receives a [`CommandContext`] holding the loaded
//! configuration and the output format. Commands that touch mirrors build
//! an [`Orchestrator`] from it:
//!
//! - SQLite mirror repository at `database.path`
//! - Blob store per `store.backend`
//! - Provider adapter for the requested provider, token from its env var
//! - HTTP workspace replicator when `replication.endpoint` is set

pub mod completions;
pub mod config;
pub mod link;
pub mod report_progress;
pub mod status;
pub mod sync;
pub mod sync_large;
pub mod unlink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use mirrorsync_cache::{DatabasePool, FsManifestStore, MemoryManifestStore, SqliteMirrorRepository};
use mirrorsync_core::config::{Config, StoreBackend};
use mirrorsync_core::domain::{Provider, WorkspaceId};
use mirrorsync_core::ports::{IManifestStore, IWorkspaceReplicator};
use mirrorsync_engine::{Orchestrator, OrchestratorOptions};
use mirrorsync_providers::{DisabledReplicator, HttpWorkspaceReplicator, ProviderAdapter};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Positional `<provider> <workspace>` pair shared by most commands
#[derive(Debug, Clone, clap::Args)]
pub struct MirrorArgs {
    /// Provider (google_drive, onedrive, dropbox, github)
    pub provider: Provider,

    /// Workspace identifier
    pub workspace: WorkspaceId,
}

/// Loaded configuration plus global flags
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Builds an orchestrator; `provider` selects the adapter to register
    pub async fn orchestrator(&self, provider: Option<Provider>) -> Result<Orchestrator> {
        let config = &self.config;

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let repository = Arc::new(SqliteMirrorRepository::new(pool.pool().clone()));

        let store: Arc<dyn IManifestStore> = match config.store.backend {
            StoreBackend::Filesystem => {
                let store = FsManifestStore::new(&config.store.root);
                debug!(root = %store.root().display(), "Using the filesystem store");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                warn!("Using the in-memory store; cached content is lost on exit");
                Arc::new(MemoryManifestStore::new())
            }
        };

        let mut orchestrator = Orchestrator::new(
            store,
            repository,
            self.replicator(),
            OrchestratorOptions::from(&config.sync),
        );

        if let Some(provider) = provider {
            let token = provider_token(config, provider)?;
            let adapter =
                ProviderAdapter::from_config(provider, config.providers.get(provider), token);
            orchestrator = orchestrator.with_adapter(Arc::new(adapter));
        }

        Ok(orchestrator)
    }

    fn replicator(&self) -> Arc<dyn IWorkspaceReplicator> {
        let replication = &self.config.replication;
        match &replication.endpoint {
            Some(endpoint) => {
                let token = std::env::var(&replication.token_env).unwrap_or_else(|_| {
                    warn!(
                        env = %replication.token_env,
                        "Workspace service token not set; sending requests without one"
                    );
                    String::new()
                });
                debug!(endpoint = %endpoint, "Workspace replication enabled");
                Arc::new(HttpWorkspaceReplicator::new(
                    endpoint.clone(),
                    token,
                    Duration::from_secs(replication.timeout_secs),
                ))
            }
            None => {
                debug!("No workspace endpoint configured; replication disabled");
                Arc::new(DisabledReplicator)
            }
        }
    }
}

/// Reads the access token of `provider` from its configured variable
fn provider_token(config: &Config, provider: Provider) -> Result<String> {
    let var = &config.providers.get(provider).token_env;
    let token = std::env::var(var)
        .with_context(|| format!("Access token for {provider} not found: set ${var}"))?;
    if token.trim().is_empty() {
        anyhow::bail!("Access token for {provider} is empty: ${var}");
    }
    Ok(token)
}
