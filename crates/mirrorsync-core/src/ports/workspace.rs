//! Workspace replication port (driven/secondary port)
//!
//! The downstream workspace pulls the mirror out of the cache. This port
//! finds the workspace's active session and tells it to pull now.

use serde::{Deserialize, Serialize};

use crate::domain::{Provider, WorkspaceId};

/// An active downstream session of a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSession {
    /// Session identifier assigned by the workspace service
    pub id: String,
}

/// "Pull the mirror now" signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSignal {
    /// Provider of the mirror
    pub provider: Provider,
    /// Workspace that owns the mirror
    pub workspace_id: WorkspaceId,
    /// Display name of the mirrored root
    pub root_name: String,
}

/// Failure talking to the workspace service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    /// Worth retrying later (timeouts, 5xx, throttling)
    #[error("Transient replication failure: {0}")]
    Transient(String),

    /// Will not succeed without intervention (rejected, malformed)
    #[error("Permanent replication failure: {0}")]
    Permanent(String),
}

/// Client of the downstream workspace service
#[async_trait::async_trait]
pub trait IWorkspaceReplicator: Send + Sync {
    /// Looks up the active session of a workspace
    async fn active_session(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<Option<WorkspaceSession>, ReplicationError>;

    /// Sends the pull signal to a session
    async fn signal_pull(
        &self,
        session: &WorkspaceSession,
        signal: &PullSignal,
    ) -> Result<(), ReplicationError>;
}
