//! MirrorRecord domain entity
//!
//! One [`MirrorRecord`] exists per (provider, workspace) pair. It remembers
//! which remote root is mirrored, where the pair stands in the sync pipeline
//! ([`MirrorStatus`]) and the progress counters shown to users.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{LeaseId, RootId, WorkspaceId};
use super::provider::Provider;

/// The remote folder or repository mirrored for a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRoot {
    /// Provider-native root identifier
    pub id: RootId,
    /// Display name
    pub name: String,
    /// Display path
    pub path: String,
}

impl RemoteRoot {
    /// Creates a new RemoteRoot
    pub fn new(id: RootId, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
        }
    }
}

// ============================================================================
// MirrorStatus
// ============================================================================

/// Pipeline stage of a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStatus {
    /// Linked, never synced
    Idle,
    /// Remote content is being copied into the cache
    SyncingCache,
    /// The downstream workspace is pulling the cache
    SyncingWorkspace,
    /// The workspace holds the latest mirror
    Ready,
    /// The last pass or replication failed
    Error,
}

impl MirrorStatus {
    /// Returns the canonical name used in storage and output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Idle => "idle",
            MirrorStatus::SyncingCache => "syncing_cache",
            MirrorStatus::SyncingWorkspace => "syncing_workspace",
            MirrorStatus::Ready => "ready",
            MirrorStatus::Error => "error",
        }
    }

    /// Returns true if a transition from `self` to `target` is allowed
    ///
    /// A new pass may start from any state. Large-file backfill re-enters
    /// `syncing_workspace` from a settled state. Nothing returns to `idle`.
    #[must_use]
    pub fn can_transition_to(&self, target: MirrorStatus) -> bool {
        use MirrorStatus::*;

        match (self, target) {
            (_, SyncingCache) => true,

            (SyncingCache, SyncingWorkspace) => true,
            (SyncingWorkspace, SyncingWorkspace) => true,
            (Ready, SyncingWorkspace) => true,
            (Error, SyncingWorkspace) => true,

            (SyncingWorkspace, Ready) => true,

            (SyncingCache, Error) => true,
            (SyncingWorkspace, Error) => true,

            _ => false,
        }
    }

    /// Returns true while a pass or replication is running
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        matches!(self, MirrorStatus::SyncingCache | MirrorStatus::SyncingWorkspace)
    }
}

impl Display for MirrorStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MirrorStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(MirrorStatus::Idle),
            "syncing_cache" => Ok(MirrorStatus::SyncingCache),
            "syncing_workspace" => Ok(MirrorStatus::SyncingWorkspace),
            "ready" => Ok(MirrorStatus::Ready),
            "error" => Ok(MirrorStatus::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown mirror status: {other}"
            ))),
        }
    }
}

/// Status the downstream workspace reports back after a pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceReport {
    /// Still pulling; only counters change
    InProgress,
    /// Pull finished
    Ready,
    /// Pull failed
    Error,
}

impl WorkspaceReport {
    /// Status the mirror moves to, if any
    #[must_use]
    pub fn target_status(&self) -> Option<MirrorStatus> {
        match self {
            WorkspaceReport::InProgress => None,
            WorkspaceReport::Ready => Some(MirrorStatus::Ready),
            WorkspaceReport::Error => Some(MirrorStatus::Error),
        }
    }
}

impl FromStr for WorkspaceReport {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(WorkspaceReport::InProgress),
            "ready" => Ok(WorkspaceReport::Ready),
            "error" => Ok(WorkspaceReport::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown workspace report: {other}"
            ))),
        }
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Progress counters of a mirror
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorCounters {
    /// Files listed by the last completed cache stage
    pub total_files: u64,
    /// Bytes listed by the last completed cache stage
    pub total_bytes: u64,
    /// Files currently cached
    pub cache_synced_files: u64,
    /// Bytes currently cached
    pub cache_synced_bytes: u64,
    /// Files the workspace reports as pulled
    pub workspace_synced_files: u64,
    /// Bytes the workspace reports as pulled
    pub workspace_synced_bytes: u64,
    /// Files skipped as large
    pub large_files: u64,
    /// Bytes skipped as large
    pub large_bytes: u64,
}

/// A pass lease held on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Holder identity
    pub holder: LeaseId,
    /// Instant after which the lease may be taken over
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Returns true if the lease is still live at `now`
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

// ============================================================================
// MirrorRecord
// ============================================================================

/// Persistent sync state of one provider/workspace pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    provider: Provider,
    workspace_id: WorkspaceId,
    root: RemoteRoot,
    status: MirrorStatus,
    counters: MirrorCounters,
    last_sync_at: Option<DateTime<Utc>>,
    sync_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    lease: Option<Lease>,
}

impl MirrorRecord {
    /// Creates a freshly linked record in the `idle` state
    pub fn new(provider: Provider, workspace_id: WorkspaceId, root: RemoteRoot) -> Self {
        let now = Utc::now();
        Self::with_timestamps(provider, workspace_id, root, now, now)
    }

    /// Creates an `idle` record with explicit timestamps (used when loading)
    pub fn with_timestamps(
        provider: Provider,
        workspace_id: WorkspaceId,
        root: RemoteRoot,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            workspace_id,
            root,
            status: MirrorStatus::Idle,
            counters: MirrorCounters::default(),
            last_sync_at: None,
            sync_error: None,
            created_at,
            updated_at,
            lease: None,
        }
    }

    /// Moves to `target`, validating the transition
    ///
    /// Entering `syncing_cache` clears the previous error. Entering `error`
    /// records `error` as the sync error.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the transition is not allowed
    pub fn transition_to(
        &mut self,
        target: MirrorStatus,
        error: Option<String>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        match target {
            MirrorStatus::Error => self.sync_error = error,
            MirrorStatus::SyncingCache => self.sync_error = None,
            _ => {}
        }

        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Restores a persisted status without validation
    pub fn set_status(&mut self, status: MirrorStatus) {
        self.status = status;
    }

    /// Replaces the counters
    pub fn set_counters(&mut self, counters: MirrorCounters) {
        self.counters = counters;
    }

    /// Sets the last successful cache stage time
    pub fn set_last_sync_at(&mut self, at: Option<DateTime<Utc>>) {
        self.last_sync_at = at;
    }

    /// Sets the sync error message
    pub fn set_sync_error(&mut self, error: Option<String>) {
        self.sync_error = error;
    }

    /// Sets the pass lease
    pub fn set_lease(&mut self, lease: Option<Lease>) {
        self.lease = lease;
    }

    /// Provider of this mirror
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Owning workspace
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// Mirrored remote root
    pub fn root(&self) -> &RemoteRoot {
        &self.root
    }

    /// Current status
    pub fn status(&self) -> MirrorStatus {
        self.status
    }

    /// Current counters
    pub fn counters(&self) -> &MirrorCounters {
        &self.counters
    }

    /// Time the last cache stage completed
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }

    /// Error of the last failed pass or replication
    pub fn sync_error(&self) -> Option<&str> {
        self.sync_error.as_deref()
    }

    /// Link time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Pass lease, if one is recorded
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }
}
