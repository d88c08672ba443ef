//! Sync-large command - Backfill files skipped as large
//!
//! `mirrorsync sync-large <provider> <workspace> <entry-id>...`

use anyhow::Result;
use clap::Args;

use mirrorsync_core::domain::EntryId;

use super::sync::print_replication;
use super::{CommandContext, MirrorArgs};
use crate::output::{human_bytes, human_duration, plural};

#[derive(Debug, Args)]
pub struct SyncLargeCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Entry ids listed as `skipped_large` in the manifest
    #[arg(required = true)]
    pub entry_ids: Vec<EntryId>,
}

impl SyncLargeCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let MirrorArgs {
            provider,
            workspace,
        } = &self.mirror;

        let orchestrator = ctx.orchestrator(Some(*provider)).await?;
        let summary = orchestrator
            .sync_large_files(*provider, workspace, &self.entry_ids)
            .await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(&summary)?);
            return Ok(());
        }

        let fetched = summary.fetched.len() as u64;
        if fetched > 0 {
            formatter.success(&format!(
                "Cached {} large file{} ({}) in {}",
                fetched,
                plural(fetched),
                human_bytes(summary.bytes_written),
                human_duration(summary.duration_ms)
            ));
        } else {
            formatter.warn("No large file was cached");
        }

        for failed in &summary.failed {
            formatter.error(&format!("{}: {}", failed.id, failed.error));
        }
        if !summary.ignored.is_empty() {
            let ids: Vec<&str> = summary.ignored.iter().map(EntryId::as_str).collect();
            formatter.warn(&format!("Not skipped as large, ignored: {}", ids.join(", ")));
        }
        if let Some(replication) = &summary.replication {
            print_replication(replication, formatter.as_ref());
        }
        formatter.info(&format!("Status: {}", summary.status));
        Ok(())
    }
}
