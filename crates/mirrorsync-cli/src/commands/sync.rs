//! Sync command - Run one mirror pass
//!
//! Provides the `mirrorsync sync <provider> <workspace>` CLI command which:
//! 1. Builds the orchestrator with the provider's adapter
//! 2. Runs the cache stage and the replication trigger
//! 3. Displays the pass summary

use anyhow::Result;
use clap::Args;

use mirrorsync_engine::{PassSummary, ReplicationResult};

use super::{CommandContext, MirrorArgs};
use crate::output::{human_bytes, human_duration, plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let MirrorArgs {
            provider,
            workspace,
        } = &self.mirror;

        let orchestrator = ctx.orchestrator(Some(*provider)).await?;

        formatter.info(&format!("Syncing {provider}/{workspace}..."));
        let summary = orchestrator.sync(*provider, workspace).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(&summary)?);
        } else {
            print_summary(&summary, formatter.as_ref());
        }
        Ok(())
    }
}

fn print_summary(summary: &PassSummary, formatter: &dyn OutputFormatter) {
    if summary.fetched_files == 0 && !summary.manifest_written {
        formatter.success(&format!(
            "Already up to date ({})",
            human_duration(summary.duration_ms)
        ));
    } else {
        formatter.success(&format!(
            "Sync pass completed in {}",
            human_duration(summary.duration_ms)
        ));
    }

    formatter.info(&format!(
        "Listed:      {} file{} ({})",
        summary.total_files,
        plural(summary.total_files),
        human_bytes(summary.total_bytes)
    ));
    formatter.info(&format!(
        "Fetched:     {} file{} ({})",
        summary.fetched_files,
        plural(summary.fetched_files),
        human_bytes(summary.bytes_written)
    ));
    formatter.info(&format!("Reused:      {}", summary.reused_files));
    if summary.large_files > 0 {
        formatter.info(&format!(
            "Large:       {} file{} ({}) skipped; use 'mirrorsync sync-large'",
            summary.large_files,
            plural(summary.large_files),
            human_bytes(summary.large_bytes)
        ));
    }
    if summary.unsupported_files > 0 {
        formatter.info(&format!("Unsupported: {}", summary.unsupported_files));
    }
    if summary.duplicate_entries > 0 {
        formatter.warn(&format!(
            "{} duplicate listing entr{} ignored",
            summary.duplicate_entries,
            if summary.duplicate_entries == 1 { "y" } else { "ies" }
        ));
    }
    if summary.failed_files > 0 {
        formatter.warn(&format!(
            "{} file{} could not be cached; see the manifest placeholders",
            summary.failed_files,
            plural(summary.failed_files)
        ));
    }

    print_replication(&summary.replication, formatter);
    formatter.info(&format!("Status:      {}", summary.status));
}

pub(crate) fn print_replication(result: &ReplicationResult, formatter: &dyn OutputFormatter) {
    match result {
        ReplicationResult::Signalled => formatter.info("Workspace:   signalled to pull"),
        ReplicationResult::NoSession => formatter.info("Workspace:   no active session"),
        ReplicationResult::TransientFailure(message) => {
            formatter.error(&format!("Workspace signal failed (transient): {message}"))
        }
        ReplicationResult::PermanentFailure(message) => {
            formatter.error(&format!("Workspace signal failed: {message}"))
        }
    }
}
