//! Report-progress command - Record the workspace's pull progress
//!
//! `mirrorsync report-progress <provider> <workspace> --files N --bytes N
//! --status in_progress|ready|error [--error MESSAGE]`
//!
//! This is the inbound side of replication: the workspace reports how much
//! of the mirror it has pulled and whether it is done.

use anyhow::Result;
use clap::Args;

use mirrorsync_core::domain::WorkspaceReport;

use super::{CommandContext, MirrorArgs};

#[derive(Debug, Args)]
pub struct ReportProgressCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Files the workspace has pulled
    #[arg(long, default_value_t = 0)]
    pub files: u64,

    /// Bytes the workspace has pulled
    #[arg(long, default_value_t = 0)]
    pub bytes: u64,

    /// Workspace status (in_progress, ready, error)
    #[arg(long)]
    pub status: WorkspaceReport,

    /// Error message, for `--status error`
    #[arg(long)]
    pub error: Option<String>,
}

impl ReportProgressCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let MirrorArgs {
            provider,
            workspace,
        } = &self.mirror;

        if self.error.is_some() && self.status != WorkspaceReport::Error {
            formatter.warn("--error is only recorded with --status error");
        }

        let orchestrator = ctx.orchestrator(None).await?;
        let record = orchestrator
            .update_workspace_progress(
                *provider,
                workspace,
                self.files,
                self.bytes,
                self.status,
                self.error.clone(),
            )
            .await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(&record)?);
        } else {
            formatter.success(&format!(
                "{provider}/{workspace}: {} ({} files, {} bytes pulled)",
                record.status(),
                record.counters().workspace_synced_files,
                record.counters().workspace_synced_bytes
            ));
        }
        Ok(())
    }
}
