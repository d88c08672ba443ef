//! Link, relink, unlink and workspace progress reports

use bytes::Bytes;
use chrono::{Duration, Utc};

use mirrorsync_core::domain::{
    CacheKey, LeaseId, MirrorStatus, Provider, RemoteRoot, RootId, WorkspaceId, WorkspaceReport,
};
use mirrorsync_core::ports::{IManifestStore, IMirrorRepository};
use mirrorsync_engine::{EngineError, LinkOutcome};

use crate::common::{self, harness, Harness, PROVIDER};

async fn synced(h: &Harness) {
    h.adapter.add_file("a", "a.txt", b"alpha", Some("fa"));
    h.adapter.add_file("b", "b.txt", b"bravo", Some("fb"));
    h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
}

fn other_root() -> RemoteRoot {
    RemoteRoot::new(RootId::new("root-2".to_string()).unwrap(), "Archive", "/Archive")
}

// ============================================================================
// Link
// ============================================================================

#[tokio::test]
async fn test_link_same_root_is_unchanged() {
    let h = harness().await;
    synced(&h).await;

    let outcome = h
        .orchestrator
        .link(PROVIDER, &common::ws(), common::root())
        .await
        .unwrap();

    assert_eq!(outcome, LinkOutcome::Unchanged);
    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Ready);
    assert_eq!(record.counters().cache_synced_files, 2);
    assert!(h.blob("a").await.is_some());
}

#[tokio::test]
async fn test_relink_purges_cache_and_resets_record() {
    let h = harness().await;
    synced(&h).await;

    // A blob of another workspace must survive the purge
    let neighbour = WorkspaceId::new("ws-10".to_string()).unwrap();
    let neighbour_key = CacheKey::file(PROVIDER, &neighbour, &common::entry_id("a"));
    h.store.put(&neighbour_key, Bytes::from_static(b"keep")).await.unwrap();

    let outcome = h
        .orchestrator
        .link(PROVIDER, &common::ws(), other_root())
        .await
        .unwrap();

    // Two blobs and the manifest
    assert_eq!(outcome, LinkOutcome::Relinked { purged_objects: 3 });
    assert!(h.blob("a").await.is_none());
    assert!(h
        .orchestrator
        .load_manifest(PROVIDER, &common::ws())
        .await
        .unwrap()
        .is_none());
    assert!(h.store.object(&neighbour_key).await.is_some());

    let record = h.record().await;
    assert_eq!(record.root().id.as_str(), "root-2");
    assert_eq!(record.root().name, "Archive");
    assert_eq!(record.status(), MirrorStatus::Idle);
    assert_eq!(record.counters().cache_synced_files, 0);
    assert!(record.last_sync_at().is_none());
    assert!(record.lease().is_none());
}

#[tokio::test]
async fn test_relink_waits_for_running_pass() {
    let h = harness().await;
    let now = Utc::now();
    h.repo
        .try_acquire_lease(PROVIDER, &common::ws(), LeaseId::new(), now, now + Duration::minutes(5))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .link(PROVIDER, &common::ws(), other_root())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::PassInProgress { .. }));
    assert_eq!(h.record().await.root().id.as_str(), "root-1");
}

// ============================================================================
// Unlink
// ============================================================================

#[tokio::test]
async fn test_unlink_removes_record_and_objects() {
    let h = harness().await;
    synced(&h).await;

    assert!(h.orchestrator.unlink(PROVIDER, &common::ws()).await.unwrap());

    assert!(h
        .orchestrator
        .status(PROVIDER, &common::ws())
        .await
        .unwrap()
        .is_none());
    let prefix = CacheKey::prefix(PROVIDER, &common::ws());
    assert!(h.store.list_keys(&prefix).await.unwrap().is_empty());

    // Unlinking again is a no-op
    assert!(!h.orchestrator.unlink(PROVIDER, &common::ws()).await.unwrap());
}

#[tokio::test]
async fn test_unlink_blocked_by_live_lease() {
    let h = harness().await;
    synced(&h).await;
    let now = Utc::now();
    h.repo
        .try_acquire_lease(PROVIDER, &common::ws(), LeaseId::new(), now, now + Duration::minutes(5))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .unlink(PROVIDER, &common::ws())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::PassInProgress { .. }));
    assert!(h.blob("a").await.is_some());
}

#[tokio::test]
async fn test_list_returns_every_record() {
    let h = harness().await;
    let second = WorkspaceId::new("ws-2".to_string()).unwrap();
    h.orchestrator
        .link(Provider::GoogleDrive, &second, other_root())
        .await
        .unwrap();

    let records = h.orchestrator.list().await.unwrap();
    let workspaces: Vec<&str> = records.iter().map(|r| r.workspace_id().as_str()).collect();
    assert_eq!(workspaces, vec!["ws-1", "ws-2"]);
}

// ============================================================================
// Workspace progress
// ============================================================================

#[tokio::test]
async fn test_in_progress_report_only_updates_counters() {
    let h = harness().await;
    h.replicator.with_active_session();
    synced(&h).await;

    let record = h
        .orchestrator
        .update_workspace_progress(
            PROVIDER,
            &common::ws(),
            1,
            5,
            WorkspaceReport::InProgress,
            None,
        )
        .await
        .unwrap();

    assert_eq!(record.status(), MirrorStatus::SyncingWorkspace);
    assert_eq!(record.counters().workspace_synced_files, 1);
    assert_eq!(record.counters().workspace_synced_bytes, 5);
    assert_eq!(record.counters().cache_synced_files, 2);
}

#[tokio::test]
async fn test_ready_report_settles_mirror() {
    let h = harness().await;
    h.replicator.with_active_session();
    synced(&h).await;

    let record = h
        .orchestrator
        .update_workspace_progress(PROVIDER, &common::ws(), 2, 10, WorkspaceReport::Ready, None)
        .await
        .unwrap();

    assert_eq!(record.status(), MirrorStatus::Ready);
    assert_eq!(record.counters().workspace_synced_files, 2);
    assert_eq!(record.counters().workspace_synced_bytes, 10);
}

#[tokio::test]
async fn test_error_report_records_message() {
    let h = harness().await;
    h.replicator.with_active_session();
    synced(&h).await;

    let record = h
        .orchestrator
        .update_workspace_progress(
            PROVIDER,
            &common::ws(),
            0,
            0,
            WorkspaceReport::Error,
            Some("disk full".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(record.status(), MirrorStatus::Error);
    assert_eq!(record.sync_error(), Some("disk full"));
}

#[tokio::test]
async fn test_error_report_without_message_gets_default() {
    let h = harness().await;
    h.replicator.with_active_session();
    synced(&h).await;

    let record = h
        .orchestrator
        .update_workspace_progress(PROVIDER, &common::ws(), 0, 0, WorkspaceReport::Error, None)
        .await
        .unwrap();

    assert_eq!(record.sync_error(), Some("Workspace reported an error"));
}

#[tokio::test]
async fn test_report_for_idle_mirror_is_rejected() {
    let h = harness().await;

    let err = h
        .orchestrator
        .update_workspace_progress(PROVIDER, &common::ws(), 1, 1, WorkspaceReport::Ready, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Domain(_)));
    let record = h.record().await;
    assert_eq!(record.status(), MirrorStatus::Idle);
    assert_eq!(record.counters().workspace_synced_files, 0);
}

#[tokio::test]
async fn test_report_for_unlinked_workspace() {
    let h = harness().await;
    let unknown = WorkspaceId::new("nobody".to_string()).unwrap();

    let err = h
        .orchestrator
        .update_workspace_progress(PROVIDER, &unknown, 0, 0, WorkspaceReport::InProgress, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotLinked { .. }));
}
