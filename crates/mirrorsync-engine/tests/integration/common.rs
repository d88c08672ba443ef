//! Shared fixtures for the engine integration tests
//!
//! - [`FakeAdapter`]: scripted remote tree with in-memory contents
//! - [`RecordingStore`]: `MemoryManifestStore` that records writes and can
//!   inject part failures
//! - [`ScriptedReplicator`]: workspace service with a settable answer
//! - [`RacingRepository`]: SQLite repository that lets another writer act at
//!   chosen points of a pass
//! - [`Harness`]: an orchestrator wired to all of the above and a linked pair

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, StreamExt};

use mirrorsync_cache::{DatabasePool, MemoryManifestStore, SqliteMirrorRepository};
use mirrorsync_core::domain::{
    CacheKey, EntryId, LeaseId, Manifest, MirrorCounters, MirrorRecord, MirrorStatus, Provider,
    RemoteEntry, RemoteRoot, RemoteTree, RootId, SyncLimits, WorkspaceId,
};
use mirrorsync_core::ports::{
    CacheStageTotals, FetchedContent, IManifestStore, IMirrorRepository, IMultipartUpload,
    IProviderAdapter, IWorkspaceReplicator, ObjectMeta, PartId, ProviderError, PullSignal,
    ReplicationError, WorkspaceSession,
};
use mirrorsync_engine::{LinkOutcome, Orchestrator, OrchestratorOptions};

pub const MIB: usize = 1024 * 1024;

/// Provider every harness is linked to
pub const PROVIDER: Provider = Provider::GoogleDrive;

pub fn ws() -> WorkspaceId {
    WorkspaceId::new("ws-1".to_string()).unwrap()
}

pub fn entry_id(id: &str) -> EntryId {
    EntryId::new(id.to_string()).unwrap()
}

pub fn root() -> RemoteRoot {
    RemoteRoot::new(RootId::new("root-1".to_string()).unwrap(), "Shared", "/Shared")
}

/// A listed binary file
pub fn remote(id: &str, path: &str, size: u64, fingerprint: Option<&str>) -> RemoteEntry {
    RemoteEntry {
        id: entry_id(id),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        mime_type: "application/octet-stream".to_string(),
        size,
        modified_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        content_fingerprint: fingerprint.map(str::to_string),
    }
}

/// `len` bytes of a repeating pattern
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Wraps `data` as fetched content, split into `chunk`-sized chunks
pub fn content(data: &[u8], chunk: usize, declared: Option<u64>) -> FetchedContent {
    let chunks: Vec<Result<Bytes, ProviderError>> = data
        .chunks(chunk.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    FetchedContent {
        stream: stream::iter(chunks).boxed(),
        declared_size: declared,
        content_type: None,
    }
}

// ============================================================================
// FakeAdapter
// ============================================================================

#[derive(Default)]
struct FakeTree {
    directories: Vec<String>,
    entries: Vec<RemoteEntry>,
    contents: HashMap<EntryId, Bytes>,
    failing: HashSet<EntryId>,
    broken: HashSet<EntryId>,
    listing_fails: bool,
}

/// Provider adapter over a scripted tree
pub struct FakeAdapter {
    provider: Provider,
    tree: Mutex<FakeTree>,
    fetches: Mutex<Vec<EntryId>>,
}

impl FakeAdapter {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            tree: Mutex::new(FakeTree::default()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn add_directory(&self, path: &str) {
        self.tree.lock().unwrap().directories.push(path.to_string());
    }

    /// Lists a file and serves `data` as its content
    pub fn add_file(&self, id: &str, path: &str, data: &[u8], fingerprint: Option<&str>) {
        let mut tree = self.tree.lock().unwrap();
        tree.entries
            .push(remote(id, path, data.len() as u64, fingerprint));
        tree.contents
            .insert(entry_id(id), Bytes::copy_from_slice(data));
    }

    /// Lists an entry without serving content for it
    pub fn add_entry(&self, entry: RemoteEntry) {
        self.tree.lock().unwrap().entries.push(entry);
    }

    /// Lists `id` with `size` while its content keeps its real length
    pub fn misreport_size(&self, id: &str, size: u64) {
        let id = entry_id(id);
        let mut tree = self.tree.lock().unwrap();
        for entry in tree.entries.iter_mut().filter(|e| e.id == id) {
            entry.size = size;
        }
    }

    /// Replaces the content and fingerprint of a listed file
    pub fn update_file(&self, id: &str, data: &[u8], fingerprint: &str) {
        let id = entry_id(id);
        let mut tree = self.tree.lock().unwrap();
        for entry in tree.entries.iter_mut().filter(|e| e.id == id) {
            entry.size = data.len() as u64;
            entry.content_fingerprint = Some(fingerprint.to_string());
        }
        tree.contents.insert(id, Bytes::copy_from_slice(data));
    }

    /// Makes fetches of `id` fail before any byte is sent
    pub fn fail_fetch(&self, id: &str, fail: bool) {
        let mut tree = self.tree.lock().unwrap();
        if fail {
            tree.failing.insert(entry_id(id));
        } else {
            tree.failing.remove(&entry_id(id));
        }
    }

    /// Makes the content stream of `id` break after its first chunk
    pub fn break_stream(&self, id: &str) {
        self.tree.lock().unwrap().broken.insert(entry_id(id));
    }

    pub fn fail_listing(&self, fail: bool) {
        self.tree.lock().unwrap().listing_fails = fail;
    }

    /// Ids fetched so far, in order
    pub fn fetches(&self) -> Vec<EntryId> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn clear_fetches(&self) {
        self.fetches.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl IProviderAdapter for FakeAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn list_tree(&self, _root: &RootId) -> Result<RemoteTree, ProviderError> {
        let tree = self.tree.lock().unwrap();
        if tree.listing_fails {
            return Err(ProviderError::Http {
                status: 500,
                message: "listing unavailable".to_string(),
            });
        }
        Ok(RemoteTree {
            directories: tree.directories.clone(),
            entries: tree.entries.clone(),
        })
    }

    async fn fetch_content(
        &self,
        _root: &RootId,
        entry_id: &EntryId,
    ) -> Result<FetchedContent, ProviderError> {
        self.fetches.lock().unwrap().push(entry_id.clone());

        let tree = self.tree.lock().unwrap();
        if tree.failing.contains(entry_id) {
            return Err(ProviderError::Http {
                status: 500,
                message: "download failed".to_string(),
            });
        }
        let data = tree
            .contents
            .get(entry_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(entry_id.to_string()))?;

        let declared = Some(data.len() as u64);
        if tree.broken.contains(entry_id) {
            let first = data.slice(..data.len().min(MIB));
            let chunks = vec![
                Ok(first),
                Err(ProviderError::Network("connection reset".to_string())),
            ];
            return Ok(FetchedContent {
                stream: stream::iter(chunks).boxed(),
                declared_size: declared,
                content_type: None,
            });
        }
        Ok(content(&data, MIB, declared))
    }
}

// ============================================================================
// RecordingStore
// ============================================================================

/// One uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPart {
    pub key: CacheKey,
    pub part_number: u32,
    pub size: usize,
}

/// Memory store that records writes
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryManifestStore,
    puts: Mutex<Vec<CacheKey>>,
    parts: Arc<Mutex<Vec<RecordedPart>>>,
    fail_part: Mutex<Option<u32>>,
    heads: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys written with a single put, in order
    pub fn puts(&self) -> Vec<CacheKey> {
        self.puts.lock().unwrap().clone()
    }

    /// Parts uploaded through multipart uploads, in order
    pub fn parts(&self) -> Vec<RecordedPart> {
        self.parts.lock().unwrap().clone()
    }

    pub fn head_calls(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    /// Makes every upload reject the part with this number
    pub fn fail_part(&self, part_number: Option<u32>) {
        *self.fail_part.lock().unwrap() = part_number;
    }

    pub async fn object(&self, key: &CacheKey) -> Option<Bytes> {
        self.inner.get(key).await.unwrap()
    }
}

#[async_trait::async_trait]
impl IManifestStore for RecordingStore {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> anyhow::Result<()> {
        self.puts.lock().unwrap().push(key.clone());
        self.inner.put(key, data).await
    }

    async fn head(&self, key: &CacheKey) -> anyhow::Result<Option<ObjectMeta>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn create_multipart_upload(
        &self,
        key: &CacheKey,
    ) -> anyhow::Result<Box<dyn IMultipartUpload>> {
        let inner = self.inner.create_multipart_upload(key).await?;
        Ok(Box::new(RecordingUpload {
            key: key.clone(),
            inner,
            parts: Arc::clone(&self.parts),
            fail_part: *self.fail_part.lock().unwrap(),
        }))
    }

    async fn delete(&self, key: &CacheKey) -> anyhow::Result<bool> {
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<CacheKey>> {
        self.inner.list_keys(prefix).await
    }
}

struct RecordingUpload {
    key: CacheKey,
    inner: Box<dyn IMultipartUpload>,
    parts: Arc<Mutex<Vec<RecordedPart>>>,
    fail_part: Option<u32>,
}

#[async_trait::async_trait]
impl IMultipartUpload for RecordingUpload {
    async fn upload_part(&mut self, part_number: u32, data: Bytes) -> anyhow::Result<PartId> {
        if self.fail_part == Some(part_number) {
            anyhow::bail!("part {part_number} rejected");
        }
        self.parts.lock().unwrap().push(RecordedPart {
            key: self.key.clone(),
            part_number,
            size: data.len(),
        });
        self.inner.upload_part(part_number, data).await
    }

    async fn complete(&mut self, parts: Vec<PartId>) -> anyhow::Result<()> {
        self.inner.complete(parts).await
    }

    async fn abort(&mut self) -> anyhow::Result<()> {
        self.inner.abort().await
    }
}

// ============================================================================
// ScriptedReplicator
// ============================================================================

/// Workspace service whose session lookup answer is set by the test
pub struct ScriptedReplicator {
    session: Mutex<Result<Option<WorkspaceSession>, ReplicationError>>,
    signals: Mutex<Vec<PullSignal>>,
}

impl ScriptedReplicator {
    /// Starts with no active session
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Ok(None)),
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(&self, session: Result<Option<WorkspaceSession>, ReplicationError>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn with_active_session(&self) {
        self.answer(Ok(Some(WorkspaceSession {
            id: "sess-1".to_string(),
        })));
    }

    pub fn signals(&self) -> Vec<PullSignal> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IWorkspaceReplicator for ScriptedReplicator {
    async fn active_session(
        &self,
        _workspace: &WorkspaceId,
    ) -> Result<Option<WorkspaceSession>, ReplicationError> {
        self.session.lock().unwrap().clone()
    }

    async fn signal_pull(
        &self,
        _session: &WorkspaceSession,
        signal: &PullSignal,
    ) -> Result<(), ReplicationError> {
        self.signals.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

// ============================================================================
// RacingRepository
// ============================================================================

/// Write another process makes while a pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Race {
    /// A pass completes its cache stage and settles at `ready` while this
    /// pass is taking the lease
    FinishPassDuringAcquire { total_files: u64 },
    /// Another holder takes the lease over after the first cached entry
    TakeOverAfterProgress,
}

/// SQLite repository with one armed [`Race`]
pub struct RacingRepository {
    inner: Arc<SqliteMirrorRepository>,
    race: Mutex<Option<Race>>,
    intruder: LeaseId,
    extensions: AtomicUsize,
}

impl RacingRepository {
    pub fn new(inner: Arc<SqliteMirrorRepository>) -> Self {
        Self {
            inner,
            race: Mutex::new(None),
            intruder: LeaseId::new(),
            extensions: AtomicUsize::new(0),
        }
    }

    /// Arms a race; it fires once
    pub fn arm(&self, race: Race) {
        *self.race.lock().unwrap() = Some(race);
    }

    /// Holder that takes the lease over in [`Race::TakeOverAfterProgress`]
    pub fn intruder(&self) -> LeaseId {
        self.intruder
    }

    /// Successful and failed `extend_lease` calls
    pub fn extensions(&self) -> usize {
        self.extensions.load(Ordering::SeqCst)
    }

    fn fire(&self, race: Race) -> bool {
        let mut armed = self.race.lock().unwrap();
        if *armed == Some(race) {
            *armed = None;
            true
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
impl IMirrorRepository for RacingRepository {
    async fn get(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> anyhow::Result<Option<MirrorRecord>> {
        self.inner.get(provider, workspace).await
    }

    async fn list(&self) -> anyhow::Result<Vec<MirrorRecord>> {
        self.inner.list().await
    }

    async fn save(&self, record: &MirrorRecord) -> anyhow::Result<()> {
        self.inner.save(record).await
    }

    async fn delete(&self, provider: Provider, workspace: &WorkspaceId) -> anyhow::Result<bool> {
        self.inner.delete(provider, workspace).await
    }

    async fn set_status(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        status: MirrorStatus,
        sync_error: Option<&str>,
    ) -> anyhow::Result<()> {
        self.inner
            .set_status(provider, workspace, status, sync_error)
            .await
    }

    async fn set_cache_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()> {
        self.inner
            .set_cache_progress(provider, workspace, files, bytes)
            .await?;
        if self.fire(Race::TakeOverAfterProgress) {
            let now = Utc::now() + chrono::Duration::seconds(1);
            let taken = self
                .inner
                .try_acquire_lease(
                    provider,
                    workspace,
                    self.intruder,
                    now,
                    now + chrono::Duration::hours(1),
                )
                .await?;
            assert!(taken, "intruder could not take the lease");
        }
        Ok(())
    }

    async fn complete_cache_stage(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        totals: &CacheStageTotals,
        last_sync_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.inner
            .complete_cache_stage(provider, workspace, totals, last_sync_at)
            .await
    }

    async fn restore_counters(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        counters: &MirrorCounters,
    ) -> anyhow::Result<()> {
        self.inner
            .restore_counters(provider, workspace, counters)
            .await
    }

    async fn set_workspace_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()> {
        self.inner
            .set_workspace_progress(provider, workspace, files, bytes)
            .await
    }

    async fn try_acquire_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let finished = match *self.race.lock().unwrap() {
            Some(Race::FinishPassDuringAcquire { total_files }) => Some(total_files),
            _ => None,
        };
        if let Some(total_files) = finished {
            self.fire(Race::FinishPassDuringAcquire { total_files });
            let totals = CacheStageTotals {
                total_files,
                total_bytes: total_files * 10,
                cache_synced_files: total_files,
                cache_synced_bytes: total_files * 10,
                large_files: 0,
                large_bytes: 0,
            };
            self.inner
                .complete_cache_stage(provider, workspace, &totals, Utc::now())
                .await?;
            self.inner
                .set_status(provider, workspace, MirrorStatus::Ready, None)
                .await?;
        }
        self.inner
            .try_acquire_lease(provider, workspace, holder, now, expires_at)
            .await
    }

    async fn extend_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.extensions.fetch_add(1, Ordering::SeqCst);
        self.inner
            .extend_lease(provider, workspace, holder, expires_at)
            .await
    }

    async fn release_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
    ) -> anyhow::Result<()> {
        self.inner.release_lease(provider, workspace, holder).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Orchestrator wired to fakes, with [`PROVIDER`]/[`ws`] linked to [`root`]
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<RecordingStore>,
    pub repo: Arc<SqliteMirrorRepository>,
    /// Repository the orchestrator writes through, wrapping `repo`
    pub racing: Arc<RacingRepository>,
    pub adapter: Arc<FakeAdapter>,
    pub replicator: Arc<ScriptedReplicator>,
}

pub async fn harness() -> Harness {
    harness_with(OrchestratorOptions::default()).await
}

pub async fn harness_with(options: OrchestratorOptions) -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteMirrorRepository::new(pool.pool().clone()));
    let racing = Arc::new(RacingRepository::new(repo.clone()));
    let store = Arc::new(RecordingStore::new());
    let adapter = Arc::new(FakeAdapter::new(PROVIDER));
    let replicator = Arc::new(ScriptedReplicator::new());

    let orchestrator = Orchestrator::new(
        store.clone(),
        racing.clone(),
        replicator.clone(),
        options,
    )
    .with_adapter(adapter.clone());

    let outcome = orchestrator.link(PROVIDER, &ws(), root()).await.unwrap();
    assert_eq!(outcome, LinkOutcome::Created);

    Harness {
        orchestrator,
        store,
        repo,
        racing,
        adapter,
        replicator,
    }
}

/// Options with small thresholds so large files stay cheap
pub fn small_limits(large_file_threshold: u64) -> OrchestratorOptions {
    OrchestratorOptions {
        limits: SyncLimits {
            large_file_threshold,
            ..SyncLimits::default()
        },
        ..OrchestratorOptions::default()
    }
}

impl Harness {
    pub async fn record(&self) -> MirrorRecord {
        self.orchestrator
            .status(PROVIDER, &ws())
            .await
            .unwrap()
            .expect("record exists")
    }

    pub async fn manifest(&self) -> Manifest {
        self.orchestrator
            .load_manifest(PROVIDER, &ws())
            .await
            .unwrap()
            .expect("manifest exists")
    }

    pub async fn manifest_bytes(&self) -> Bytes {
        self.store
            .object(&CacheKey::manifest(PROVIDER, &ws()))
            .await
            .expect("manifest stored")
    }

    pub async fn blob(&self, id: &str) -> Option<Bytes> {
        self.store
            .object(&CacheKey::file(PROVIDER, &ws(), &entry_id(id)))
            .await
    }
}
