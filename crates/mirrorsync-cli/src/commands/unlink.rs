//! Unlink command - Remove a mirror and its cached content

use anyhow::Result;
use clap::Args;

use super::{CommandContext, MirrorArgs};

#[derive(Debug, Args)]
pub struct UnlinkCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,
}

impl UnlinkCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let MirrorArgs {
            provider,
            workspace,
        } = &self.mirror;

        let orchestrator = ctx.orchestrator(None).await?;
        let existed = orchestrator.unlink(*provider, workspace).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "provider": provider,
                "workspaceId": workspace,
                "removed": existed,
            }));
        } else if existed {
            formatter.success(&format!("Unlinked {provider}/{workspace}"));
        } else {
            formatter.warn(&format!("{provider}/{workspace} was not linked"));
        }
        Ok(())
    }
}
