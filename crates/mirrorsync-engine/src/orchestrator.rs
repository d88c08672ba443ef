//! Sync orchestrator
//!
//! The [`Orchestrator`] runs mirror passes for (provider, workspace) pairs
//! and owns the lifecycle of their mirror records.
//!
//! ## Pass Flow
//!
//! 1. **Lease**: take the pair's lease; a live lease held by someone else
//!    fails with [`EngineError::PassInProgress`]. The record is read again
//!    once the lease is held
//! 2. **Begin**: snapshot the counters, move to `syncing_cache`, zero counters
//! 3. **Cache stage**: list the tree, classify every entry against the
//!    previous manifest, fetch and write what changed, persist progress after
//!    every cached entry, then commit the new manifest (skipped when the
//!    content is unchanged)
//! 4. **Totals**: persist totals and move to `syncing_workspace`
//! 5. **Replication**: signal the workspace; the outcome decides the final
//!    status
//! 6. **Release** the lease, on success and on failure
//!
//! A failure before the manifest commit moves the record to `error` and
//! restores the counters snapshot. After the commit, counters stay as
//! persisted.
//!
//! The lease is renewed between entries once less than half of its TTL is
//! left. When another holder has taken it over, the pass stops with
//! [`EngineError::LeaseLost`] and leaves the record to the new holder.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use mirrorsync_core::config::SyncConfig;
use mirrorsync_core::domain::{
    CacheKey, CacheStatus, DomainError, EntryId, FileEntry, LeaseId, Manifest, MirrorCounters,
    MirrorRecord, MirrorStatus, Placeholder, Provider, RemoteEntry, RemoteRoot, RootId,
    SyncLimits, WorkspaceId, WorkspaceReport,
};
use mirrorsync_core::ports::{
    CacheStageTotals, IManifestStore, IMirrorRepository, IProviderAdapter, IWorkspaceReplicator,
    ProviderError, PullSignal,
};

use crate::diff::{self, Classification};
use crate::replication::{self, ReplicationResult, REPLICATION_FAILED_MESSAGE};
use crate::writer::{ContentWriter, WriteError, WriteOutcome};
use crate::EngineError;

/// Sync error recorded when the workspace reports a failure without detail
const WORKSPACE_ERROR_MESSAGE: &str = "Workspace reported an error";

// ============================================================================
// Options and results
// ============================================================================

/// Tunables of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Size thresholds
    pub limits: SyncLimits,
    /// Confirm reused blobs with `head` before trusting the manifest
    pub verify_cached_blobs: bool,
    /// How long a pass lease stays live
    pub lease_ttl: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            limits: SyncLimits::default(),
            verify_cached_blobs: true,
            lease_ttl: Duration::from_secs(3600),
        }
    }
}

impl From<&SyncConfig> for OrchestratorOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            limits: config.limits(),
            verify_cached_blobs: config.verify_cached_blobs,
            lease_ttl: Duration::from_secs(config.lease_ttl_secs),
        }
    }
}

/// Summary of a completed sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub provider: Provider,
    pub workspace_id: WorkspaceId,
    /// Distinct entries listed
    pub total_files: u64,
    /// Bytes listed
    pub total_bytes: u64,
    /// Entries downloaded and written this pass
    pub fetched_files: u64,
    /// Entries whose cached content was reused
    pub reused_files: u64,
    /// Bytes written to the store
    pub bytes_written: u64,
    /// Entries skipped as large
    pub large_files: u64,
    /// Bytes skipped as large
    pub large_bytes: u64,
    /// Provider-native documents
    pub unsupported_files: u64,
    /// Entries whose fetch or write failed
    pub failed_files: u64,
    /// Listed entries dropped because their id was already seen
    pub duplicate_entries: u64,
    /// False when the manifest was unchanged and left as stored
    pub manifest_written: bool,
    pub replication: ReplicationResult,
    /// Status the record settled at
    pub status: MirrorStatus,
    pub duration_ms: u64,
}

/// One entry a backfill could not cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub id: EntryId,
    pub error: String,
}

/// Summary of a large-file backfill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub provider: Provider,
    pub workspace_id: WorkspaceId,
    /// Entries now cached
    pub fetched: Vec<EntryId>,
    /// Entries that stayed `skipped_large` because the fetch failed
    pub failed: Vec<FailedEntry>,
    /// Requested ids that are unknown or not `skipped_large`
    pub ignored: Vec<EntryId>,
    pub bytes_written: u64,
    /// `None` when nothing was fetched and the workspace was not signalled
    pub replication: Option<ReplicationResult>,
    pub status: MirrorStatus,
    pub duration_ms: u64,
}

/// What [`Orchestrator::link`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    /// A new record was created
    Created,
    /// The pair was already linked to the same root
    Unchanged,
    /// The pair was linked to another root; its cache was purged
    Relinked { purged_objects: usize },
}

/// Why one entry could not be cached
#[derive(Debug, Error)]
enum EntryFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ProviderError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Default)]
struct StageTally {
    fetched_files: u64,
    reused_files: u64,
    bytes_written: u64,
    unsupported_files: u64,
    failed_files: u64,
    duplicate_entries: u64,
    cached_files: u64,
    cached_bytes: u64,
}

struct CacheStage {
    manifest: Manifest,
    manifest_written: bool,
    tally: StageTally,
}

/// Lease held by a running pass
#[derive(Debug, Clone, Copy)]
struct PassLease {
    holder: LeaseId,
    expires_at: DateTime<Utc>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs sync passes and manages mirror records
///
/// ## Dependencies
///
/// - `adapters`: one provider adapter per provider that can be synced
/// - `store`: blob store holding manifests and cached content
/// - `repository`: mirror record persistence and leases
/// - `replicator`: downstream workspace service
pub struct Orchestrator {
    adapters: HashMap<Provider, Arc<dyn IProviderAdapter>>,
    store: Arc<dyn IManifestStore>,
    repository: Arc<dyn IMirrorRepository>,
    replicator: Arc<dyn IWorkspaceReplicator>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Creates an orchestrator without any provider adapter
    pub fn new(
        store: Arc<dyn IManifestStore>,
        repository: Arc<dyn IMirrorRepository>,
        replicator: Arc<dyn IWorkspaceReplicator>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            adapters: HashMap::new(),
            store,
            repository,
            replicator,
            options,
        }
    }

    /// Registers the adapter used for its provider
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn IProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Effective options
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    // ========================================================================
    // Sync pass
    // ========================================================================

    /// Runs one full mirror pass for the pair
    ///
    /// # Errors
    /// - `NoAdapter` / `NotLinked` / `PassInProgress` before anything changes
    /// - `Listing` if the remote tree cannot be listed (record set to `error`,
    ///   counters restored)
    /// - `Storage` if the repository or the store fails
    /// - `LeaseLost` if another holder took the lease over mid-pass (the
    ///   record is left as that holder wrote it)
    ///
    /// A replication failure is not an error: the pass returns its summary
    /// with the record in `error`.
    #[tracing::instrument(skip(self))]
    pub async fn sync(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<PassSummary, EngineError> {
        let adapter = self.adapter(provider)?;
        self.load(provider, workspace).await?;
        let mut lease = self.acquire_lease(provider, workspace).await?;

        // Another pass may have finished between the first read and the lease
        let result = match self.load(provider, workspace).await {
            Ok(record) => self.run_pass(adapter.as_ref(), record, &mut lease).await,
            Err(e) => Err(e),
        };

        self.release_lease(provider, workspace, lease.holder).await;
        result
    }

    async fn run_pass(
        &self,
        adapter: &dyn IProviderAdapter,
        mut record: MirrorRecord,
        lease: &mut PassLease,
    ) -> Result<PassSummary, EngineError> {
        let started = Instant::now();
        let provider = record.provider();
        let workspace = record.workspace_id().clone();
        let snapshot = *record.counters();

        if let Err(e) = self.begin_pass(&mut record).await {
            self.fail_before_commit(provider, &workspace, &snapshot, &e)
                .await;
            return Err(e);
        }

        info!(
            provider = %provider,
            workspace = %workspace,
            root = %record.root().id,
            "Starting sync pass"
        );

        let stage = match self.cache_stage(adapter, &record, lease).await {
            Ok(stage) => stage,
            Err(e) => {
                if !e.is_lease_lost() {
                    self.fail_before_commit(provider, &workspace, &snapshot, &e)
                        .await;
                }
                return Err(e);
            }
        };

        let (total_files, total_bytes) = stage
            .manifest
            .entries()
            .iter()
            .fold((0u64, 0u64), |(files, bytes), e| (files + 1, bytes + e.size));
        let (large_files, large_bytes) = stage.manifest.totals_for(CacheStatus::SkippedLarge);
        let (cached_files, cached_bytes) = stage.manifest.totals_for(CacheStatus::Cached);
        let totals = CacheStageTotals {
            total_files,
            total_bytes,
            cache_synced_files: cached_files,
            cache_synced_bytes: cached_bytes,
            large_files,
            large_bytes,
        };

        let replication = match self.settle(&mut record, &totals, lease).await {
            Ok(replication) => replication,
            Err(e) => {
                if !e.is_lease_lost() {
                    self.mark_error(provider, &workspace, &e.to_string()).await;
                }
                return Err(e);
            }
        };

        let tally = stage.tally;
        let summary = PassSummary {
            provider,
            workspace_id: workspace,
            total_files,
            total_bytes,
            fetched_files: tally.fetched_files,
            reused_files: tally.reused_files,
            bytes_written: tally.bytes_written,
            large_files,
            large_bytes,
            unsupported_files: tally.unsupported_files,
            failed_files: tally.failed_files,
            duplicate_entries: tally.duplicate_entries,
            manifest_written: stage.manifest_written,
            replication,
            status: record.status(),
            duration_ms: elapsed_ms(started),
        };

        info!(
            provider = %summary.provider,
            workspace = %summary.workspace_id,
            total = summary.total_files,
            fetched = summary.fetched_files,
            reused = summary.reused_files,
            large = summary.large_files,
            unsupported = summary.unsupported_files,
            failed = summary.failed_files,
            bytes_written = summary.bytes_written,
            status = %summary.status,
            duration_ms = summary.duration_ms,
            "Sync pass finished"
        );

        Ok(summary)
    }

    /// Moves the record to `syncing_cache` with zeroed counters
    ///
    /// Only the status and counters are written, so totals and the last sync
    /// time stay as stored until the cache stage completes.
    async fn begin_pass(&self, record: &mut MirrorRecord) -> Result<(), EngineError> {
        record.transition_to(MirrorStatus::SyncingCache, None)?;
        record.set_counters(MirrorCounters::default());
        self.repository
            .set_status(
                record.provider(),
                record.workspace_id(),
                MirrorStatus::SyncingCache,
                None,
            )
            .await?;
        self.repository
            .restore_counters(
                record.provider(),
                record.workspace_id(),
                &MirrorCounters::default(),
            )
            .await?;
        Ok(())
    }

    async fn cache_stage(
        &self,
        adapter: &dyn IProviderAdapter,
        record: &MirrorRecord,
        lease: &mut PassLease,
    ) -> Result<CacheStage, EngineError> {
        let provider = record.provider();
        let workspace = record.workspace_id();
        let root = record.root();

        let tree = adapter
            .list_tree(&root.id)
            .await
            .map_err(EngineError::Listing)?;
        info!(
            directories = tree.directories.len(),
            entries = tree.entries.len(),
            bytes = tree.total_bytes(),
            "Listed remote tree"
        );

        let previous = self.load_manifest(provider, workspace).await?;
        let prior_index = previous.as_ref().map(Manifest::index).unwrap_or_default();

        let writer = ContentWriter::new(self.store.as_ref(), self.options.limits);
        let mut tally = StageTally::default();
        let mut seen = HashSet::with_capacity(tree.entries.len());
        let mut entries = Vec::with_capacity(tree.entries.len());

        for remote in tree.entries {
            if !seen.insert(remote.id.clone()) {
                warn!(entry_id = %remote.id, "Duplicate entry id in listing, keeping the first");
                tally.duplicate_entries += 1;
                continue;
            }
            self.keep_lease(provider, workspace, lease).await?;

            let prior = prior_index.get(&remote.id).copied();
            let entry = self
                .process_entry(adapter, &writer, record, remote, prior, &mut tally)
                .await;

            if entry.is_cached() {
                tally.cached_files += 1;
                tally.cached_bytes += entry.size;
                self.repository
                    .set_cache_progress(provider, workspace, tally.cached_files, tally.cached_bytes)
                    .await?;
            }
            entries.push(entry);
        }

        let (manifest, _) = Manifest::build(root, tree.directories, entries);

        let manifest_written = match &previous {
            Some(prev) if prev.same_content(&manifest) => {
                debug!("Manifest unchanged, keeping the stored document");
                false
            }
            _ => {
                self.keep_lease(provider, workspace, lease).await?;
                let key = CacheKey::manifest(provider, workspace);
                self.store
                    .put(&key, Bytes::from(manifest.to_json()?))
                    .await?;
                debug!(key = %key, "Manifest written");
                true
            }
        };

        Ok(CacheStage {
            manifest,
            manifest_written,
            tally,
        })
    }

    async fn process_entry(
        &self,
        adapter: &dyn IProviderAdapter,
        writer: &ContentWriter<'_>,
        record: &MirrorRecord,
        remote: RemoteEntry,
        prior: Option<&FileEntry>,
        tally: &mut StageTally,
    ) -> FileEntry {
        let provider = record.provider();

        match diff::classify(provider, &self.options.limits, &remote, prior) {
            Classification::Unsupported => {
                debug!(entry_id = %remote.id, mime_type = %remote.mime_type, "Skipping unsupported entry");
                tally.unsupported_files += 1;
                let placeholder = Placeholder::unsupported(&remote.mime_type);
                FileEntry::skipped(remote, CacheStatus::SkippedUnsupported, placeholder)
            }
            Classification::Large => {
                info!(entry_id = %remote.id, size = remote.size, "Skipping large file");
                FileEntry::skipped(remote, CacheStatus::SkippedLarge, Placeholder::too_large())
            }
            Classification::Reuse => {
                let key = CacheKey::file(provider, record.workspace_id(), &remote.id);
                let stored = prior.map_or(remote.size, FileEntry::stored_bytes);
                let present = !self.options.verify_cached_blobs
                    || diff::blob_present(self.store.as_ref(), &key, stored).await;
                if present {
                    tally.reused_files += 1;
                    FileEntry::stored(remote, stored)
                } else {
                    self.fetch_entry(adapter, writer, record, remote, tally).await
                }
            }
            Classification::NeedsFetch => {
                self.fetch_entry(adapter, writer, record, remote, tally).await
            }
        }
    }

    async fn fetch_entry(
        &self,
        adapter: &dyn IProviderAdapter,
        writer: &ContentWriter<'_>,
        record: &MirrorRecord,
        remote: RemoteEntry,
        tally: &mut StageTally,
    ) -> FileEntry {
        let key = CacheKey::file(record.provider(), record.workspace_id(), &remote.id);

        match fetch_and_write(adapter, writer, &record.root().id, &key, &remote.id, remote.size)
            .await
        {
            Ok(outcome) => {
                debug!(entry_id = %remote.id, bytes = outcome.bytes, parts = outcome.parts, "Cached entry");
                tally.fetched_files += 1;
                tally.bytes_written += outcome.bytes;
                FileEntry::stored(remote, outcome.bytes)
            }
            Err(e) => {
                warn!(entry_id = %remote.id, path = %remote.path, error = %e, "Failed to cache entry");
                tally.failed_files += 1;
                FileEntry::skipped(
                    remote,
                    CacheStatus::SkippedUnsupported,
                    Placeholder::fetch_failed(e.to_string()),
                )
            }
        }
    }

    /// Persists cache-stage totals, then signals the workspace
    async fn settle(
        &self,
        record: &mut MirrorRecord,
        totals: &CacheStageTotals,
        lease: &mut PassLease,
    ) -> Result<ReplicationResult, EngineError> {
        self.keep_lease(record.provider(), record.workspace_id(), lease)
            .await?;
        record.transition_to(MirrorStatus::SyncingWorkspace, None)?;
        self.repository
            .complete_cache_stage(record.provider(), record.workspace_id(), totals, Utc::now())
            .await?;
        self.replicate(record).await
    }

    async fn replicate(&self, record: &mut MirrorRecord) -> Result<ReplicationResult, EngineError> {
        let signal = PullSignal {
            provider: record.provider(),
            workspace_id: record.workspace_id().clone(),
            root_name: record.root().name.clone(),
        };
        let result = replication::trigger(self.replicator.as_ref(), &signal).await;

        let target = result.target_status();
        if target != record.status() {
            let sync_error = result
                .is_failure()
                .then(|| REPLICATION_FAILED_MESSAGE.to_string());
            record.transition_to(target, sync_error)?;
            self.repository
                .set_status(
                    record.provider(),
                    record.workspace_id(),
                    target,
                    record.sync_error(),
                )
                .await?;
        }

        Ok(result)
    }

    async fn fail_before_commit(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        snapshot: &MirrorCounters,
        cause: &EngineError,
    ) {
        self.mark_error(provider, workspace, &cause.to_string()).await;
        if let Err(e) = self
            .repository
            .restore_counters(provider, workspace, snapshot)
            .await
        {
            error!(provider = %provider, workspace = %workspace, error = %e, "Failed to restore counters");
        }
    }

    async fn mark_error(&self, provider: Provider, workspace: &WorkspaceId, message: &str) {
        error!(provider = %provider, workspace = %workspace, error = message, "Sync pass failed");
        if let Err(e) = self
            .repository
            .set_status(provider, workspace, MirrorStatus::Error, Some(message))
            .await
        {
            error!(provider = %provider, workspace = %workspace, error = %e, "Failed to record sync error");
        }
    }

    // ========================================================================
    // Large-file backfill
    // ========================================================================

    /// Fetches entries a previous pass skipped as large
    ///
    /// Only ids currently `skipped_large` in the manifest are fetched; every
    /// other manifest entry is left untouched. When at least one entry was
    /// cached, the manifest is rewritten, the record moves to
    /// `syncing_workspace` and the workspace is signalled.
    #[tracing::instrument(skip(self))]
    pub async fn sync_large_files(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        entry_ids: &[EntryId],
    ) -> Result<BackfillSummary, EngineError> {
        let adapter = self.adapter(provider)?;
        self.load(provider, workspace).await?;
        let mut lease = self.acquire_lease(provider, workspace).await?;

        let result = match self.load(provider, workspace).await {
            Ok(record) => {
                self.run_backfill(adapter.as_ref(), record, entry_ids, &mut lease)
                    .await
            }
            Err(e) => Err(e),
        };

        self.release_lease(provider, workspace, lease.holder).await;
        result
    }

    async fn run_backfill(
        &self,
        adapter: &dyn IProviderAdapter,
        mut record: MirrorRecord,
        entry_ids: &[EntryId],
        lease: &mut PassLease,
    ) -> Result<BackfillSummary, EngineError> {
        let started = Instant::now();
        let provider = record.provider();
        let workspace = record.workspace_id().clone();

        let mut summary = BackfillSummary {
            provider,
            workspace_id: workspace.clone(),
            fetched: Vec::new(),
            failed: Vec::new(),
            ignored: Vec::new(),
            bytes_written: 0,
            replication: None,
            status: record.status(),
            duration_ms: 0,
        };

        let mut manifest = match self.load_manifest(provider, &workspace).await? {
            Some(manifest) => manifest,
            None => {
                warn!("No manifest yet, nothing to backfill");
                summary.ignored = entry_ids.to_vec();
                summary.duration_ms = elapsed_ms(started);
                return Ok(summary);
            }
        };

        let writer = ContentWriter::new(self.store.as_ref(), self.options.limits);
        let root_id = record.root().id.clone();
        let mut requested = HashSet::new();

        for id in entry_ids {
            if !requested.insert(id) {
                continue;
            }
            let size = match manifest.entry(id) {
                Some(entry) if entry.cache_status == CacheStatus::SkippedLarge => entry.size,
                _ => {
                    debug!(entry_id = %id, "Not a skipped large file, ignoring");
                    summary.ignored.push(id.clone());
                    continue;
                }
            };

            self.keep_lease(provider, &workspace, lease).await?;
            let key = CacheKey::file(provider, &workspace, id);
            match fetch_and_write(adapter, &writer, &root_id, &key, id, size).await {
                Ok(outcome) => {
                    info!(entry_id = %id, bytes = outcome.bytes, parts = outcome.parts, "Large file cached");
                    if let Some(entry) = manifest.entry_mut(id) {
                        entry.mark_cached(outcome.bytes);
                    }
                    summary.bytes_written += outcome.bytes;
                    summary.fetched.push(id.clone());
                }
                Err(e) => {
                    warn!(entry_id = %id, error = %e, "Failed to cache large file");
                    summary.failed.push(FailedEntry {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if summary.fetched.is_empty() {
            summary.duration_ms = elapsed_ms(started);
            return Ok(summary);
        }

        self.keep_lease(provider, &workspace, lease).await?;
        manifest.touch();
        self.store
            .put(
                &CacheKey::manifest(provider, &workspace),
                Bytes::from(manifest.to_json()?),
            )
            .await?;

        let counters = *record.counters();
        let (cached_files, cached_bytes) = manifest.totals_for(CacheStatus::Cached);
        let (large_files, large_bytes) = manifest.totals_for(CacheStatus::SkippedLarge);
        let totals = CacheStageTotals {
            total_files: counters.total_files,
            total_bytes: counters.total_bytes,
            cache_synced_files: cached_files,
            cache_synced_bytes: cached_bytes,
            large_files,
            large_bytes,
        };

        let replication = match self.settle(&mut record, &totals, lease).await {
            Ok(replication) => replication,
            Err(e) => {
                if !e.is_lease_lost() {
                    self.mark_error(provider, &workspace, &e.to_string()).await;
                }
                return Err(e);
            }
        };

        summary.replication = Some(replication);
        summary.status = record.status();
        summary.duration_ms = elapsed_ms(started);
        Ok(summary)
    }

    // ========================================================================
    // Inbound workspace status
    // ========================================================================

    /// Records progress reported by the workspace
    ///
    /// `in_progress` only updates the workspace counters; `ready` and
    /// `error` also move the status, validated by the state machine.
    #[tracing::instrument(skip(self))]
    pub async fn update_workspace_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files_synced: u64,
        bytes_synced: u64,
        report: WorkspaceReport,
        error: Option<String>,
    ) -> Result<MirrorRecord, EngineError> {
        let mut record = self.load(provider, workspace).await?;

        let target = report.target_status();
        if let Some(target) = target {
            let sync_error = match target {
                MirrorStatus::Error => {
                    Some(error.unwrap_or_else(|| WORKSPACE_ERROR_MESSAGE.to_string()))
                }
                _ => None,
            };
            record.transition_to(target, sync_error)?;
        }

        self.repository
            .set_workspace_progress(provider, workspace, files_synced, bytes_synced)
            .await?;
        if target.is_some() {
            self.repository
                .set_status(provider, workspace, record.status(), record.sync_error())
                .await?;
        }

        info!(
            files_synced,
            bytes_synced,
            status = %record.status(),
            "Workspace progress recorded"
        );
        self.load(provider, workspace).await
    }

    // ========================================================================
    // Record lifecycle
    // ========================================================================

    /// Links a workspace to a remote root
    ///
    /// Linking to the same root again changes nothing. Linking to another
    /// root purges the cached objects of the pair and resets the record.
    #[tracing::instrument(skip(self))]
    pub async fn link(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        root: RemoteRoot,
    ) -> Result<LinkOutcome, EngineError> {
        match self.repository.get(provider, workspace).await? {
            None => {
                let record = MirrorRecord::new(provider, workspace.clone(), root);
                self.repository.save(&record).await?;
                info!(root = %record.root().id, "Mirror linked");
                Ok(LinkOutcome::Created)
            }
            Some(existing) if existing.root().id == root.id => Ok(LinkOutcome::Unchanged),
            Some(existing) => {
                let lease = self.acquire_lease(provider, workspace).await?;
                let result = self.relink(provider, workspace, root).await;
                self.release_lease(provider, workspace, lease.holder).await;

                if result.is_ok() {
                    info!(old_root = %existing.root().id, "Mirror relinked to a new root");
                }
                result
            }
        }
    }

    async fn relink(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        root: RemoteRoot,
    ) -> Result<LinkOutcome, EngineError> {
        let purged_objects = self.purge(provider, workspace).await?;
        let record = MirrorRecord::new(provider, workspace.clone(), root);
        self.repository.save(&record).await?;
        Ok(LinkOutcome::Relinked { purged_objects })
    }

    /// Deletes every cached object of the pair, then its record
    ///
    /// Returns whether a record existed.
    #[tracing::instrument(skip(self))]
    pub async fn unlink(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<bool, EngineError> {
        let holder = match self.repository.get(provider, workspace).await? {
            Some(_) => Some(self.acquire_lease(provider, workspace).await?.holder),
            None => None,
        };

        let result = self.purge_and_delete(provider, workspace).await;

        // A deleted record takes its lease with it
        if let (Err(_), Some(holder)) = (&result, holder) {
            self.release_lease(provider, workspace, holder).await;
        }

        let existed = result?;
        info!(existed, "Mirror unlinked");
        Ok(existed)
    }

    async fn purge_and_delete(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<bool, EngineError> {
        self.purge(provider, workspace).await?;
        Ok(self.repository.delete(provider, workspace).await?)
    }

    async fn purge(&self, provider: Provider, workspace: &WorkspaceId) -> Result<usize, EngineError> {
        let prefix = CacheKey::prefix(provider, workspace);
        let keys = self.store.list_keys(&prefix).await?;

        let mut deleted = 0;
        for key in &keys {
            if self.store.delete(key).await? {
                deleted += 1;
            }
        }

        info!(prefix = %prefix, deleted, "Purged cached objects");
        Ok(deleted)
    }

    /// Returns the record of the pair, if linked
    pub async fn status(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<Option<MirrorRecord>, EngineError> {
        Ok(self.repository.get(provider, workspace).await?)
    }

    /// Returns every record
    pub async fn list(&self) -> Result<Vec<MirrorRecord>, EngineError> {
        Ok(self.repository.list().await?)
    }

    /// Reads the stored manifest of the pair
    ///
    /// A missing or unreadable manifest is `None`; an unreadable one is
    /// logged and rebuilt by the next pass.
    pub async fn load_manifest(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<Option<Manifest>, EngineError> {
        let key = CacheKey::manifest(provider, workspace);
        let bytes = match self.store.get(&key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        match Manifest::from_json(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable manifest");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn IProviderAdapter>, EngineError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(EngineError::NoAdapter(provider))
    }

    async fn load(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<MirrorRecord, EngineError> {
        self.repository
            .get(provider, workspace)
            .await?
            .ok_or_else(|| EngineError::NotLinked {
                provider,
                workspace: workspace.clone(),
            })
    }

    fn lease_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
        let expires_at = chrono::Duration::from_std(self.options.lease_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| DomainError::ValidationFailed("lease TTL out of range".to_string()))?;
        Ok(expires_at)
    }

    async fn acquire_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> Result<PassLease, EngineError> {
        let holder = LeaseId::new();
        let now = Utc::now();
        let expires_at = self.lease_expiry(now)?;

        if self
            .repository
            .try_acquire_lease(provider, workspace, holder, now, expires_at)
            .await?
        {
            debug!(holder = %holder, "Lease acquired");
            Ok(PassLease { holder, expires_at })
        } else {
            Err(EngineError::PassInProgress {
                provider,
                workspace: workspace.clone(),
            })
        }
    }

    /// Renews the lease once less than half of its TTL is left
    ///
    /// Fails with `LeaseLost` when another holder owns the lease.
    async fn keep_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        lease: &mut PassLease,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let remaining = (lease.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        if remaining > self.options.lease_ttl / 2 {
            return Ok(());
        }

        let expires_at = self.lease_expiry(now)?;
        if self
            .repository
            .extend_lease(provider, workspace, lease.holder, expires_at)
            .await?
        {
            debug!(holder = %lease.holder, expires_at = %expires_at, "Lease renewed");
            lease.expires_at = expires_at;
            Ok(())
        } else {
            warn!(holder = %lease.holder, "Lease taken over by another holder, stopping");
            Err(EngineError::LeaseLost {
                provider,
                workspace: workspace.clone(),
            })
        }
    }

    async fn release_lease(&self, provider: Provider, workspace: &WorkspaceId, holder: LeaseId) {
        if let Err(e) = self
            .repository
            .release_lease(provider, workspace, holder)
            .await
        {
            warn!(provider = %provider, workspace = %workspace, error = %e, "Failed to release lease");
        }
    }
}

async fn fetch_and_write(
    adapter: &dyn IProviderAdapter,
    writer: &ContentWriter<'_>,
    root: &RootId,
    key: &CacheKey,
    entry_id: &EntryId,
    listed_size: u64,
) -> Result<WriteOutcome, EntryFailure> {
    let content = adapter.fetch_content(root, entry_id).await?;
    Ok(writer.write(key, content, listed_size).await?)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
