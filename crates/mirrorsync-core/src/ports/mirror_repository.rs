//! Mirror record repository port (driven/secondary port)
//!
//! Persists one [`MirrorRecord`] per provider/workspace pair. Besides a full
//! upsert, the port exposes narrow column updates so that progress can be
//! written after every cached file without rewriting the whole record.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Narrow updates on a missing record are no-ops.
//! - `save` never touches the lease columns; only the lease operations do.

use chrono::{DateTime, Utc};

use crate::domain::{LeaseId, MirrorCounters, MirrorRecord, MirrorStatus, Provider, WorkspaceId};

/// Totals written when the cache stage of a pass completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStageTotals {
    /// Files listed
    pub total_files: u64,
    /// Bytes listed
    pub total_bytes: u64,
    /// Files cached after the pass
    pub cache_synced_files: u64,
    /// Bytes cached after the pass
    pub cache_synced_bytes: u64,
    /// Files skipped as large
    pub large_files: u64,
    /// Bytes skipped as large
    pub large_bytes: u64,
}

/// Persistent storage for mirror records
#[async_trait::async_trait]
pub trait IMirrorRepository: Send + Sync {
    /// Loads the record of a pair
    async fn get(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> anyhow::Result<Option<MirrorRecord>>;

    /// Lists every record, ordered by provider then workspace
    async fn list(&self) -> anyhow::Result<Vec<MirrorRecord>>;

    /// Inserts or replaces a record (lease columns excluded)
    async fn save(&self, record: &MirrorRecord) -> anyhow::Result<()>;

    /// Deletes a record; returns whether it existed
    async fn delete(&self, provider: Provider, workspace: &WorkspaceId) -> anyhow::Result<bool>;

    /// Sets the status and sync error
    async fn set_status(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        status: MirrorStatus,
        sync_error: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Sets the cache progress counters
    async fn set_cache_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()>;

    /// Writes pass totals, `last_sync_at` and `syncing_workspace` in one update
    async fn complete_cache_stage(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        totals: &CacheStageTotals,
        last_sync_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Overwrites every counter
    async fn restore_counters(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        counters: &MirrorCounters,
    ) -> anyhow::Result<()>;

    /// Sets the workspace progress counters
    async fn set_workspace_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()>;

    /// Takes the pass lease if it is free or expired at `now`
    ///
    /// Returns `false` if another holder has a live lease or the record
    /// does not exist.
    async fn try_acquire_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Moves the expiry of a lease `holder` still owns
    ///
    /// Returns `false` once another holder has taken the lease over or the
    /// record is gone. An expired lease nobody took over can still be
    /// extended.
    async fn extend_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Releases the lease if `holder` still owns it
    async fn release_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
    ) -> anyhow::Result<()>;
}
