//! Link command - Attach a workspace to a remote root
//!
//! `mirrorsync link <provider> <workspace> <root-id> --name <name>`
//!
//! Linking the same root again is a no-op. Linking a different root purges
//! the pair's cached objects and resets its record.

use anyhow::Result;
use clap::Args;
use tracing::info;

use mirrorsync_core::domain::{RemoteRoot, RootId};
use mirrorsync_engine::LinkOutcome;

use super::{CommandContext, MirrorArgs};

#[derive(Debug, Args)]
pub struct LinkCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Provider-native id of the root (folder id, path, or owner/repo[@ref])
    pub root_id: RootId,

    /// Display name of the root
    #[arg(long)]
    pub name: Option<String>,

    /// Display path of the root
    #[arg(long)]
    pub path: Option<String>,
}

impl LinkCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let orchestrator = ctx.orchestrator(None).await?;

        let name = self
            .name
            .clone()
            .unwrap_or_else(|| self.root_id.to_string());
        let path = self.path.clone().unwrap_or_else(|| format!("/{name}"));
        let root = RemoteRoot::new(self.root_id.clone(), name, path);

        let MirrorArgs {
            provider,
            workspace,
        } = &self.mirror;
        info!(provider = %provider, workspace = %workspace, root = %root.id, "Linking mirror");

        let outcome = orchestrator.link(*provider, workspace, root).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "provider": provider,
                "workspaceId": workspace,
                "rootId": self.root_id,
                "outcome": outcome,
            }));
            return Ok(());
        }

        match outcome {
            LinkOutcome::Created => {
                formatter.success(&format!("Linked {provider}/{workspace} to {}", self.root_id))
            }
            LinkOutcome::Unchanged => {
                formatter.success(&format!("{provider}/{workspace} is already linked to {}", self.root_id))
            }
            LinkOutcome::Relinked { purged_objects } => {
                formatter.success(&format!("Relinked {provider}/{workspace} to {}", self.root_id));
                formatter.info(&format!(
                    "Purged {} cached object{}",
                    purged_objects,
                    crate::output::plural(purged_objects as u64)
                ));
            }
        }
        Ok(())
    }
}
