//! Full sync passes: caching, reuse, skipped entries, failures, leases and
//! replication outcomes

use chrono::{Duration, Utc};

use mirrorsync_core::domain::limits::LARGE_FILE_THRESHOLD;
use mirrorsync_core::domain::{
    CacheKey, CacheStatus, LeaseId, MirrorCounters, MirrorStatus, PlaceholderReason, Provider,
    WorkspaceId,
};
use mirrorsync_core::ports::{IManifestStore, IMirrorRepository, ReplicationError};
use mirrorsync_engine::replication::REPLICATION_FAILED_MESSAGE;
use mirrorsync_engine::{EngineError, OrchestratorOptions, ReplicationResult};

use crate::common::{self, harness, Harness, Race, PROVIDER};

fn seed(h: &Harness) {
    h.adapter.add_directory("docs");
    h.adapter.add_file("a", "a.txt", b"alpha", Some("fa"));
    h.adapter.add_file("b", "docs/b.txt", b"bravo!", Some("fb"));
    h.adapter.add_file("c", "docs/c.txt", b"charlie", Some("fc"));
}

// ============================================================================
// Caching and reuse
// ============================================================================

#[tokio::test]
async fn test_first_pass_caches_every_file() {
    let h = harness().await;
    seed(&h);

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.total_bytes, 18);
    assert_eq!(summary.fetched_files, 3);
    assert_eq!(summary.reused_files, 0);
    assert_eq!(summary.bytes_written, 18);
    assert!(summary.manifest_written);
    assert_eq!(summary.replication, ReplicationResult::NoSession);
    assert_eq!(summary.status, MirrorStatus::Ready);

    assert_eq!(h.blob("a").await.unwrap().as_ref(), b"alpha");
    assert_eq!(h.blob("b").await.unwrap().as_ref(), b"bravo!");

    let manifest = h.manifest().await;
    assert_eq!(manifest.directories(), ["docs".to_string()]);
    assert_eq!(manifest.entries().len(), 3);
    assert!(manifest.entries().iter().all(|e| e.is_cached()));
    assert_eq!(manifest.root_name(), "Shared");

    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Ready);
    assert_eq!(record.counters().total_files, 3);
    assert_eq!(record.counters().total_bytes, 18);
    assert_eq!(record.counters().cache_synced_files, 3);
    assert_eq!(record.counters().cache_synced_bytes, 18);
    assert!(record.last_sync_at().is_some());
    assert!(record.sync_error().is_none());
}

#[tokio::test]
async fn test_unchanged_tree_writes_nothing() {
    let h = harness().await;
    seed(&h);
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    let before = h.manifest_bytes().await;
    let puts = h.store.puts().len();
    h.adapter.clear_fetches();

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.fetched_files, 0);
    assert_eq!(summary.reused_files, 3);
    assert_eq!(summary.bytes_written, 0);
    assert!(!summary.manifest_written);
    assert!(h.adapter.fetches().is_empty());
    assert_eq!(h.store.puts().len(), puts);
    assert_eq!(h.manifest_bytes().await, before);
    assert_eq!(h.record().await.counters().cache_synced_files, 3);
}

#[tokio::test]
async fn test_changed_fingerprint_fetches_only_that_file() {
    let h = harness().await;
    seed(&h);
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    h.adapter.clear_fetches();

    h.adapter.update_file("b", b"bravo v2", "fb2");
    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(h.adapter.fetches(), vec![common::entry_id("b")]);
    assert_eq!(summary.fetched_files, 1);
    assert_eq!(summary.reused_files, 2);
    assert!(summary.manifest_written);
    assert_eq!(h.blob("b").await.unwrap().as_ref(), b"bravo v2");

    let manifest = h.manifest().await;
    let b = manifest.entry(&common::entry_id("b")).unwrap();
    assert_eq!(b.content_fingerprint.as_deref(), Some("fb2"));
    assert_eq!(b.size, 8);
}

#[tokio::test]
async fn test_missing_blob_is_fetched_again() {
    let h = harness().await;
    seed(&h);
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    h.adapter.clear_fetches();

    let key = CacheKey::file(PROVIDER, &common::ws(), &common::entry_id("a"));
    assert!(h.store.delete(&key).await.unwrap());

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(h.adapter.fetches(), vec![common::entry_id("a")]);
    assert_eq!(summary.fetched_files, 1);
    assert_eq!(summary.reused_files, 2);
    assert_eq!(h.blob("a").await.unwrap().as_ref(), b"alpha");
}

#[tokio::test]
async fn test_reuse_without_verification_skips_head() {
    let h = common::harness_with(mirrorsync_engine::OrchestratorOptions {
        verify_cached_blobs: false,
        ..Default::default()
    })
    .await;
    seed(&h);
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.reused_files, 3);
    assert_eq!(h.store.head_calls(), 0);
}

#[tokio::test]
async fn test_misreported_size_is_not_fetched_again() {
    let h = harness().await;
    h.adapter.add_file("a", "a.txt", b"seven!!", Some("fa"));
    h.adapter.misreport_size("a", 10);

    let first = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    assert_eq!(first.fetched_files, 1);
    assert_eq!(first.bytes_written, 7);
    let manifest = h.manifest().await;
    let entry = manifest.entry(&common::entry_id("a")).unwrap();
    assert_eq!(entry.size, 10);
    assert_eq!(entry.stored_size, Some(7));

    h.adapter.clear_fetches();
    let second = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert!(h.adapter.fetches().is_empty());
    assert_eq!(second.reused_files, 1);
    assert_eq!(second.fetched_files, 0);
    assert!(!second.manifest_written);
}

#[tokio::test]
async fn test_empty_tree_completes() {
    let h = harness().await;

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.status, MirrorStatus::Ready);
    assert!(h.manifest().await.entries().is_empty());
}

// ============================================================================
// Skipped entries
// ============================================================================

#[tokio::test]
async fn test_native_documents_are_never_fetched() {
    let h = harness().await;
    let mut doc = common::remote("doc", "Notes", 0, None);
    doc.mime_type = "application/vnd.google-apps.document".to_string();
    h.adapter.add_entry(doc);
    h.adapter.add_file("a", "a.txt", b"alpha", None);

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.unsupported_files, 1);
    assert_eq!(summary.fetched_files, 1);
    assert_eq!(h.adapter.fetches(), vec![common::entry_id("a")]);

    let manifest = h.manifest().await;
    let doc = manifest.entry(&common::entry_id("doc")).unwrap();
    assert_eq!(doc.cache_status, CacheStatus::SkippedUnsupported);
    assert_eq!(
        doc.placeholder.as_ref().unwrap().reason,
        PlaceholderReason::Unsupported
    );
    assert!(h.blob("doc").await.is_none());
}

#[tokio::test]
async fn test_large_file_threshold_boundary() {
    let h = harness().await;
    h.adapter
        .add_entry(common::remote("at", "at.iso", LARGE_FILE_THRESHOLD, Some("x")));
    h.adapter
        .add_entry(common::remote("below", "below.iso", LARGE_FILE_THRESHOLD - 1, Some("y")));

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    // "below" has no content behind it, so its fetch is attempted and fails
    assert_eq!(h.adapter.fetches(), vec![common::entry_id("below")]);
    assert_eq!(summary.large_files, 1);
    assert_eq!(summary.large_bytes, LARGE_FILE_THRESHOLD);
    assert_eq!(summary.failed_files, 1);

    let manifest = h.manifest().await;
    let at = manifest.entry(&common::entry_id("at")).unwrap();
    assert_eq!(at.cache_status, CacheStatus::SkippedLarge);
    assert_eq!(at.placeholder.as_ref().unwrap().reason, PlaceholderReason::TooLarge);

    let record = h.record().await;
    assert_eq!(record.counters().large_files, 1);
    assert_eq!(record.counters().large_bytes, LARGE_FILE_THRESHOLD);
    assert_eq!(record.counters().total_files, 2);
}

#[tokio::test]
async fn test_duplicate_ids_keep_first_entry() {
    let h = harness().await;
    h.adapter.add_file("a", "a.txt", b"alpha", Some("fa"));
    h.adapter.add_entry(common::remote("a", "copy/a.txt", 5, Some("fa")));

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.duplicate_entries, 1);
    assert_eq!(summary.total_files, 1);
    let manifest = h.manifest().await;
    assert_eq!(manifest.entries().len(), 1);
    assert_eq!(manifest.entries()[0].path, "a.txt");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_fetch_does_not_stop_the_pass() {
    let h = harness().await;
    seed(&h);
    h.adapter.fail_fetch("b", true);

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.fetched_files, 2);
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.status, MirrorStatus::Ready);

    let manifest = h.manifest().await;
    let b = manifest.entry(&common::entry_id("b")).unwrap();
    assert_eq!(b.cache_status, CacheStatus::SkippedUnsupported);
    let placeholder = b.placeholder.as_ref().unwrap();
    assert_eq!(placeholder.reason, PlaceholderReason::FetchFailed);
    assert!(placeholder.detail.as_deref().unwrap().contains("download failed"));
    assert!(h.blob("b").await.is_none());
    assert!(h.blob("c").await.is_some());

    let record = h.record().await;
    assert_eq!(record.counters().cache_synced_files, 2);
    assert_eq!(record.counters().cache_synced_bytes, 12);

    // The next pass retries the failed entry
    h.adapter.fail_fetch("b", false);
    h.adapter.clear_fetches();
    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    assert_eq!(h.adapter.fetches(), vec![common::entry_id("b")]);
    assert_eq!(summary.failed_files, 0);
    assert!(h.manifest().await.entries().iter().all(|e| e.is_cached()));
}

#[tokio::test]
async fn test_broken_multipart_stream_leaves_no_object() {
    let h = harness().await;
    h.adapter.add_file("big", "big.bin", &common::payload(30 * common::MIB), Some("fbig"));
    h.adapter.add_file("a", "a.txt", b"alpha", Some("fa"));
    h.adapter.break_stream("big");

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.fetched_files, 1);
    assert!(h.blob("big").await.is_none());
    assert_eq!(h.store.inner.open_uploads(), 0);

    let manifest = h.manifest().await;
    let big = manifest.entry(&common::entry_id("big")).unwrap();
    assert_eq!(
        big.placeholder.as_ref().unwrap().reason,
        PlaceholderReason::FetchFailed
    );
}

#[tokio::test]
async fn test_listing_failure_restores_counters() {
    let h = harness().await;
    seed(&h);
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    let counters = *h.record().await.counters();
    let manifest = h.manifest_bytes().await;

    h.adapter.fail_listing(true);
    let err = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap_err();

    assert!(matches!(err, EngineError::Listing(_)));
    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Error);
    assert!(record.sync_error().unwrap().contains("Listing failed"));
    assert_eq!(record.counters(), &counters);
    assert_eq!(h.manifest_bytes().await, manifest);

    // The lease was released, so a new pass can start and recover
    h.adapter.fail_listing(false);
    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    assert_eq!(summary.status, MirrorStatus::Ready);
    assert!(h.record().await.sync_error().is_none());
}

#[tokio::test]
async fn test_listing_failure_on_first_pass_keeps_zero_counters() {
    let h = harness().await;
    h.adapter.fail_listing(true);

    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap_err();

    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Error);
    assert_eq!(record.counters(), &MirrorCounters::default());
    assert!(record.last_sync_at().is_none());
}

// ============================================================================
// Preconditions and leases
// ============================================================================

#[tokio::test]
async fn test_unlinked_pair_is_rejected() {
    let h = harness().await;
    let other = WorkspaceId::new("ws-unknown".to_string()).unwrap();

    let err = h.orchestrator.sync(PROVIDER, &other).await.unwrap_err();
    assert!(matches!(err, EngineError::NotLinked { .. }));
}

#[tokio::test]
async fn test_provider_without_adapter_is_rejected() {
    let h = harness().await;

    let err = h
        .orchestrator
        .sync(Provider::Dropbox, &common::ws())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoAdapter(Provider::Dropbox)));
}

#[tokio::test]
async fn test_live_lease_blocks_second_pass() {
    let h = harness().await;
    seed(&h);
    let now = Utc::now();
    let other = LeaseId::new();
    assert!(h
        .repo
        .try_acquire_lease(PROVIDER, &common::ws(), other, now, now + Duration::minutes(10))
        .await
        .unwrap());

    let err = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap_err();

    assert!(matches!(err, EngineError::PassInProgress { .. }));
    assert!(h.adapter.fetches().is_empty());
    assert_eq!(h.record().await.status(), MirrorStatus::Idle);

    h.repo.release_lease(PROVIDER, &common::ws(), other).await.unwrap();
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let h = harness().await;
    let past = Utc::now() - Duration::hours(2);
    assert!(h
        .repo
        .try_acquire_lease(PROVIDER, &common::ws(), LeaseId::new(), past, past + Duration::minutes(5))
        .await
        .unwrap());

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    assert_eq!(summary.status, MirrorStatus::Ready);
}

/// Options whose lease needs renewing before every step of a pass
fn renew_every_step() -> OrchestratorOptions {
    OrchestratorOptions {
        lease_ttl: std::time::Duration::ZERO,
        ..OrchestratorOptions::default()
    }
}

#[tokio::test]
async fn test_pass_starts_from_the_record_read_under_lease() {
    let h = harness().await;
    h.racing.arm(Race::FinishPassDuringAcquire { total_files: 5 });
    h.adapter.fail_listing(true);

    let err = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap_err();

    assert!(matches!(err, EngineError::Listing(_)));
    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Error);
    // Counters and the last sync time written by the finished pass survive
    assert_eq!(record.counters().total_files, 5);
    assert_eq!(record.counters().cache_synced_files, 5);
    assert!(record.last_sync_at().is_some());
}

#[tokio::test]
async fn test_short_lease_is_renewed_through_the_pass() {
    let h = common::harness_with(renew_every_step()).await;
    seed(&h);

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.status, MirrorStatus::Ready);
    assert_eq!(summary.fetched_files, 3);
    // Once per entry, before the manifest write and before settling
    assert_eq!(h.racing.extensions(), 5);
    assert!(h.record().await.lease().is_none());
}

#[tokio::test]
async fn test_pass_stops_when_lease_is_taken_over() {
    let h = common::harness_with(renew_every_step()).await;
    seed(&h);
    h.racing.arm(Race::TakeOverAfterProgress);

    let err = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap_err();

    assert!(matches!(err, EngineError::LeaseLost { .. }));
    assert_eq!(h.adapter.fetches(), vec![common::entry_id("a")]);
    assert!(h
        .store
        .object(&CacheKey::manifest(PROVIDER, &common::ws()))
        .await
        .is_none());

    // The record is left to the new holder
    let record = h.record().await;
    assert_eq!(record.lease().unwrap().holder, h.racing.intruder());
    assert_eq!(record.status(), MirrorStatus::SyncingCache);
    assert!(record.sync_error().is_none());
}

#[tokio::test]
async fn test_lease_is_released_after_pass() {
    let h = harness().await;
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    let now = Utc::now();
    assert!(h
        .repo
        .try_acquire_lease(PROVIDER, &common::ws(), LeaseId::new(), now, now + Duration::minutes(1))
        .await
        .unwrap());
    assert!(h.record().await.lease().is_some());
}

// ============================================================================
// Replication outcomes
// ============================================================================

#[tokio::test]
async fn test_active_session_is_signalled() {
    let h = harness().await;
    seed(&h);
    h.replicator.with_active_session();

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.replication, ReplicationResult::Signalled);
    assert_eq!(summary.status, MirrorStatus::SyncingWorkspace);
    assert_eq!(h.record().await.status(), MirrorStatus::SyncingWorkspace);

    let signals = h.replicator.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].provider, PROVIDER);
    assert_eq!(signals[0].workspace_id, common::ws());
    assert_eq!(signals[0].root_name, "Shared");
}

#[tokio::test]
async fn test_replication_failure_marks_error_but_keeps_cache() {
    let h = harness().await;
    seed(&h);
    h.replicator
        .answer(Err(ReplicationError::Transient("workspace service timed out".to_string())));

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert!(matches!(summary.replication, ReplicationResult::TransientFailure(_)));
    assert_eq!(summary.status, MirrorStatus::Error);

    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Error);
    assert_eq!(record.sync_error(), Some(REPLICATION_FAILED_MESSAGE));
    assert_eq!(record.counters().cache_synced_files, 3);
    assert!(record.last_sync_at().is_some());
    assert_eq!(h.manifest().await.entries().len(), 3);
}

#[tokio::test]
async fn test_permanent_replication_failure() {
    let h = harness().await;
    h.replicator
        .answer(Err(ReplicationError::Permanent("HTTP 403".to_string())));

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(
        summary.replication,
        ReplicationResult::PermanentFailure("HTTP 403".to_string())
    );
    assert_eq!(h.record().await.sync_error(), Some(REPLICATION_FAILED_MESSAGE));
}
