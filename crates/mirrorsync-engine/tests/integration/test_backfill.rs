//! Large-file backfill after a regular pass

use mirrorsync_core::domain::{CacheStatus, MirrorStatus};
use mirrorsync_engine::ReplicationResult;

use crate::common::{self, entry_id, small_limits, Harness, PROVIDER};

const THRESHOLD: u64 = 1024;

async fn synced() -> Harness {
    let h = common::harness_with(small_limits(THRESHOLD)).await;
    h.adapter.add_file("small", "small.txt", b"tiny", Some("fs"));
    h.adapter.add_file("big1", "media/big1.bin", &common::payload(2000), Some("f1"));
    h.adapter.add_file("big2", "media/big2.bin", &common::payload(3000), Some("f2"));

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();
    assert_eq!(summary.large_files, 2);
    assert_eq!(summary.large_bytes, 5000);
    h.adapter.clear_fetches();
    h
}

#[tokio::test]
async fn test_backfill_caches_requested_large_file() {
    let h = synced().await;

    let summary = h
        .orchestrator
        .sync_large_files(PROVIDER, &common::ws(), &[entry_id("big1")])
        .await
        .unwrap();

    assert_eq!(summary.fetched, vec![entry_id("big1")]);
    assert!(summary.failed.is_empty());
    assert!(summary.ignored.is_empty());
    assert_eq!(summary.bytes_written, 2000);
    assert_eq!(summary.replication, Some(ReplicationResult::NoSession));
    assert_eq!(summary.status, MirrorStatus::Ready);
    assert_eq!(h.adapter.fetches(), vec![entry_id("big1")]);
    assert_eq!(h.blob("big1").await.unwrap().len(), 2000);

    let manifest = h.manifest().await;
    let big1 = manifest.entry(&entry_id("big1")).unwrap();
    assert_eq!(big1.cache_status, CacheStatus::Cached);
    assert!(big1.placeholder.is_none());
    let big2 = manifest.entry(&entry_id("big2")).unwrap();
    assert_eq!(big2.cache_status, CacheStatus::SkippedLarge);
    assert!(manifest.entry(&entry_id("small")).unwrap().is_cached());

    let counters = *h.record().await.counters();
    assert_eq!(counters.total_files, 3);
    assert_eq!(counters.cache_synced_files, 2);
    assert_eq!(counters.cache_synced_bytes, 2004);
    assert_eq!(counters.large_files, 1);
    assert_eq!(counters.large_bytes, 3000);
}

#[tokio::test]
async fn test_backfill_ignores_ids_that_are_not_skipped_large() {
    let h = synced().await;

    let summary = h
        .orchestrator
        .sync_large_files(
            PROVIDER,
            &common::ws(),
            &[entry_id("small"), entry_id("ghost"), entry_id("big2")],
        )
        .await
        .unwrap();

    assert_eq!(summary.fetched, vec![entry_id("big2")]);
    assert_eq!(summary.ignored, vec![entry_id("small"), entry_id("ghost")]);
    assert_eq!(h.adapter.fetches(), vec![entry_id("big2")]);
}

#[tokio::test]
async fn test_backfill_signals_workspace() {
    let h = synced().await;
    h.replicator.with_active_session();

    let summary = h
        .orchestrator
        .sync_large_files(PROVIDER, &common::ws(), &[entry_id("big1"), entry_id("big2")])
        .await
        .unwrap();

    assert_eq!(summary.fetched.len(), 2);
    assert_eq!(summary.replication, Some(ReplicationResult::Signalled));
    assert_eq!(h.record().await.status(), MirrorStatus::SyncingWorkspace);
    assert_eq!(h.replicator.signals().len(), 1);
    assert_eq!(h.record().await.counters().large_files, 0);
}

#[tokio::test]
async fn test_failed_backfill_changes_nothing() {
    let h = synced().await;
    h.adapter.fail_fetch("big1", true);
    let manifest = h.manifest_bytes().await;
    let record = h.record().await;

    let summary = h
        .orchestrator
        .sync_large_files(PROVIDER, &common::ws(), &[entry_id("big1")])
        .await
        .unwrap();

    assert!(summary.fetched.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].id, entry_id("big1"));
    assert!(summary.failed[0].error.contains("download failed"));
    assert_eq!(summary.replication, None);

    assert_eq!(h.manifest_bytes().await, manifest);
    let after = h.record().await;
    assert_eq!(after.status(), record.status());
    assert_eq!(after.counters(), record.counters());
    assert!(h.replicator.signals().is_empty());

    let big1 = h.manifest().await;
    assert_eq!(
        big1.entry(&entry_id("big1")).unwrap().cache_status,
        CacheStatus::SkippedLarge
    );
}

#[tokio::test]
async fn test_backfill_before_first_pass_ignores_everything() {
    let h = common::harness_with(small_limits(THRESHOLD)).await;

    let summary = h
        .orchestrator
        .sync_large_files(PROVIDER, &common::ws(), &[entry_id("big1")])
        .await
        .unwrap();

    assert_eq!(summary.ignored, vec![entry_id("big1")]);
    assert_eq!(summary.status, MirrorStatus::Idle);
    assert!(h.adapter.fetches().is_empty());
}

#[tokio::test]
async fn test_regular_pass_skips_backfilled_file_again() {
    let h = synced().await;
    h.orchestrator
        .sync_large_files(PROVIDER, &common::ws(), &[entry_id("big1")])
        .await
        .unwrap();

    let summary = h.orchestrator.sync(PROVIDER, &common::ws()).await.unwrap();

    assert_eq!(summary.large_files, 2);
    let manifest = h.manifest().await;
    assert_eq!(
        manifest.entry(&entry_id("big1")).unwrap().cache_status,
        CacheStatus::SkippedLarge
    );
}
