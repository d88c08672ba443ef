//! Status command - Display mirror records
//!
//! Provides the `mirrorsync status` CLI command which:
//! 1. Lists every linked mirror when no pair is given
//! 2. Shows one record in detail for `<provider> <workspace>`
//! 3. With `--entries`, lists the manifest entries that are not cached

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::info;

use mirrorsync_core::domain::{CacheStatus, Manifest, MirrorRecord, Provider, WorkspaceId};

use super::CommandContext;
use crate::output::{human_bytes, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Provider of the mirror to show
    #[arg(requires = "workspace")]
    pub provider: Option<Provider>,

    /// Workspace of the mirror to show
    pub workspace: Option<WorkspaceId>,

    /// Also list entries that are not cached (large, unsupported, failed)
    #[arg(long, requires = "provider")]
    pub entries: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let orchestrator = ctx.orchestrator(None).await?;

        let (provider, workspace) = match (self.provider, &self.workspace) {
            (Some(provider), Some(workspace)) => (provider, workspace),
            _ => {
                let records = orchestrator.list().await?;
                info!(count = records.len(), "Listing mirrors");
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::to_value(&records)?);
                } else {
                    print_list(&records, formatter.as_ref());
                }
                return Ok(());
            }
        };

        let record = match orchestrator.status(provider, workspace).await? {
            Some(record) => record,
            None => anyhow::bail!("No mirror linked for {provider}/{workspace}"),
        };
        let manifest = if self.entries {
            orchestrator.load_manifest(provider, workspace).await?
        } else {
            None
        };

        if ctx.format.is_json() {
            let mut json = serde_json::json!({ "record": record });
            if let Some(manifest) = &manifest {
                let pending: Vec<_> = manifest
                    .entries()
                    .iter()
                    .filter(|e| !e.is_cached())
                    .collect();
                json["entries"] = serde_json::to_value(pending)?;
            }
            formatter.print_json(&json);
        } else {
            print_record(&record, formatter.as_ref());
            if let Some(manifest) = &manifest {
                print_pending(manifest, formatter.as_ref());
            }
        }
        Ok(())
    }
}

fn print_list(records: &[MirrorRecord], formatter: &dyn OutputFormatter) {
    if records.is_empty() {
        formatter.success("No mirrors linked");
        return;
    }

    formatter.success(&format!("{} mirror(s)", records.len()));
    for record in records {
        let counters = record.counters();
        formatter.info(&format!(
            "{:<13} {:<24} {:<18} {}/{} files cached",
            record.provider().as_str(),
            record.workspace_id().as_str(),
            record.status().as_str(),
            counters.cache_synced_files,
            counters.total_files,
        ));
    }
}

fn print_record(record: &MirrorRecord, formatter: &dyn OutputFormatter) {
    let counters = record.counters();

    formatter.success(&format!(
        "{}/{}: {}",
        record.provider(),
        record.workspace_id(),
        record.status()
    ));
    formatter.info(&format!(
        "Root:       {} ({}, id {})",
        record.root().name,
        record.root().path,
        record.root().id
    ));
    formatter.info(&format!(
        "Cache:      {}/{} files, {} of {}",
        counters.cache_synced_files,
        counters.total_files,
        human_bytes(counters.cache_synced_bytes),
        human_bytes(counters.total_bytes)
    ));
    formatter.info(&format!(
        "Workspace:  {} files, {}",
        counters.workspace_synced_files,
        human_bytes(counters.workspace_synced_bytes)
    ));
    if counters.large_files > 0 {
        formatter.info(&format!(
            "Large:      {} files, {} not cached",
            counters.large_files,
            human_bytes(counters.large_bytes)
        ));
    }
    formatter.info(&format!(
        "Last sync:  {}",
        record
            .last_sync_at()
            .map(|t| format!("{} ({})", t.to_rfc3339(), ago(t, Utc::now())))
            .unwrap_or_else(|| "never".to_string())
    ));
    if let Some(error) = record.sync_error() {
        formatter.error(error);
    }
    if let Some(lease) = record.lease() {
        let state = if lease.is_live(Utc::now()) {
            "held"
        } else {
            "expired"
        };
        formatter.info(&format!(
            "Lease:      {} by {} until {}",
            state,
            lease.holder,
            lease.expires_at.to_rfc3339()
        ));
    }
}

/// Coarse age such as `42s ago` or `3h ago`
fn ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 0 => "in the future".to_string(),
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

fn print_pending(manifest: &Manifest, formatter: &dyn OutputFormatter) {
    let pending: Vec<_> = manifest
        .entries()
        .iter()
        .filter(|e| !e.is_cached())
        .collect();
    if pending.is_empty() {
        formatter.info("Every entry is cached");
        return;
    }

    formatter.info("");
    formatter.info("Not cached:");
    for entry in pending {
        let status = match entry.cache_status {
            CacheStatus::SkippedLarge => "large",
            CacheStatus::SkippedUnsupported => "skipped",
            CacheStatus::Cached => "cached",
        };
        let detail = entry
            .placeholder
            .as_ref()
            .and_then(|p| p.detail.as_deref())
            .unwrap_or("");
        formatter.info(&format!(
            "  [{status:<7}] {} ({}, id {}) {detail}",
            entry.path,
            human_bytes(entry.size),
            entry.id
        ));
    }
}
