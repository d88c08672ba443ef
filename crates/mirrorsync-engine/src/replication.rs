//! Workspace replication trigger
//!
//! After the cache stage, the workspace that owns the mirror is told to
//! pull it. The outcome decides where the record settles:
//!
//! | Outcome            | Status              |
//! |--------------------|---------------------|
//! | `Signalled`        | `syncing_workspace` |
//! | `NoSession`        | `ready`             |
//! | `TransientFailure` | `error`             |
//! | `PermanentFailure` | `error`             |
//!
//! There is no retry; the next pass signals again.

use serde::Serialize;
use tracing::{info, warn};

use mirrorsync_core::domain::MirrorStatus;
use mirrorsync_core::ports::{IWorkspaceReplicator, PullSignal, ReplicationError};

/// Sync error recorded when the workspace could not be signalled
pub const REPLICATION_FAILED_MESSAGE: &str = "Failed to signal workspace to pull mirror";

/// Outcome of one replication trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ReplicationResult {
    /// The active session accepted the pull signal
    Signalled,
    /// The workspace has no active session
    NoSession,
    /// Lookup or signal failed in a way worth retrying later
    TransientFailure(String),
    /// Lookup or signal was rejected
    PermanentFailure(String),
}

impl ReplicationResult {
    /// Status the record moves to for this outcome
    #[must_use]
    pub fn target_status(&self) -> MirrorStatus {
        match self {
            Self::Signalled => MirrorStatus::SyncingWorkspace,
            Self::NoSession => MirrorStatus::Ready,
            Self::TransientFailure(_) | Self::PermanentFailure(_) => MirrorStatus::Error,
        }
    }

    /// Returns true for either failure outcome
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TransientFailure(_) | Self::PermanentFailure(_))
    }
}

impl From<ReplicationError> for ReplicationResult {
    fn from(error: ReplicationError) -> Self {
        match error {
            ReplicationError::Transient(msg) => Self::TransientFailure(msg),
            ReplicationError::Permanent(msg) => Self::PermanentFailure(msg),
        }
    }
}

/// Looks up the workspace's session and sends it the pull signal
pub async fn trigger(replicator: &dyn IWorkspaceReplicator, signal: &PullSignal) -> ReplicationResult {
    let session = match replicator.active_session(&signal.workspace_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            info!(workspace = %signal.workspace_id, "No active workspace session");
            return ReplicationResult::NoSession;
        }
        Err(e) => {
            warn!(workspace = %signal.workspace_id, error = %e, "Workspace session lookup failed");
            return e.into();
        }
    };

    match replicator.signal_pull(&session, signal).await {
        Ok(()) => {
            info!(
                workspace = %signal.workspace_id,
                session = %session.id,
                "Workspace signalled to pull mirror"
            );
            ReplicationResult::Signalled
        }
        Err(e) => {
            warn!(
                workspace = %signal.workspace_id,
                session = %session.id,
                error = %e,
                "Workspace pull signal failed"
            );
            e.into()
        }
    }
}
