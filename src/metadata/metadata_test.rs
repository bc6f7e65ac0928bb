use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_test::traced_test;

use super::*;
use crate::storage::MockDocumentStore;
use crate::test_utils::producer;
use crate::test_utils::MemoryStore;
use crate::StoreError;

const PRODUCER: &str = "port-operator";

fn five_device_roster() -> Producer {
    producer(
        PRODUCER,
        "Harbor Authority",
        &[
            ("D1", "Crane A"),
            ("D2", "Crane B"),
            ("D3", "Reefer Bank 1"),
            ("D4", "Shore Power 4"),
            ("D5", "Battery Store"),
        ],
    )
}

#[tokio::test]
async fn lookup_before_any_refresh_resolves_to_sentinel() {
    let cache = MetadataCache::new(MemoryStore::new(), PRODUCER);

    let info = cache.lookup("D1");
    assert!(info.is_unknown());
}

#[tokio::test]
async fn refresh_builds_mapping_from_producer_roster() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = MetadataCache::new(store, PRODUCER);

    let count = cache.refresh().await.unwrap();

    assert_eq!(count, 5);
    assert_eq!(cache.lookup("D1"), DeviceInfo::new("Crane A", "Harbor Authority"));
    assert_eq!(cache.lookup("D5").name, "Battery Store");
}

#[tokio::test]
async fn unknown_device_resolves_to_sentinel() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = MetadataCache::new(store, PRODUCER);
    cache.refresh().await.unwrap();

    let info = cache.lookup("nonexistent-device");
    assert_eq!(info, DeviceInfo::unknown());
    assert_eq!(info.name, "Unknown");
    assert_eq!(info.owner, "Unknown");
}

#[tokio::test]
async fn failed_refresh_keeps_previously_loaded_mapping() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = MetadataCache::new(store.clone(), PRODUCER);
    cache.refresh().await.unwrap();
    let before: Vec<_> = ["D1", "D2", "D3", "D4", "D5"].iter().map(|d| cache.lookup(d)).collect();

    store.fail_producer_lookups(true);
    let result = cache.refresh().await;

    assert!(matches!(result, Err(FeedError::MetadataFetch { .. })));
    let after: Vec<_> = ["D1", "D2", "D3", "D4", "D5"].iter().map(|d| cache.lookup(d)).collect();
    assert_eq!(before, after);
    assert!(after.iter().all(|info| !info.is_unknown()));
}

#[tokio::test]
#[traced_test]
async fn failed_refresh_is_logged_with_retained_device_count() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = MetadataCache::new(store.clone(), PRODUCER);
    cache.refresh().await.unwrap();

    store.fail_producer_lookups(true);
    let _ = cache.refresh().await;

    assert!(logs_contain("keeping previous mapping"));
    assert!(logs_contain("retained_devices=5"));
}

#[tokio::test]
async fn missing_producer_keeps_previous_mapping() {
    let mut store = MockDocumentStore::new();
    let mut calls = 0;
    store.expect_find_producer().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(Some(five_device_roster()))
        } else {
            Ok(None)
        }
    });
    let cache = MetadataCache::new(Arc::new(store), PRODUCER);

    cache.refresh().await.unwrap();
    let err = cache.refresh().await.unwrap_err();

    assert!(matches!(err, FeedError::ProducerNotFound { .. }));
    assert_eq!(cache.lookup("D3").name, "Reefer Bank 1");
}

#[tokio::test]
async fn first_load_failure_leaves_empty_mapping() {
    let mut store = MockDocumentStore::new();
    store
        .expect_find_producer()
        .returning(|_| Err(StoreError::Unavailable("store down".into())));
    let cache = MetadataCache::new(Arc::new(store), PRODUCER);

    assert!(cache.refresh().await.is_err());
    assert!(cache.snapshot().is_empty());
    assert!(cache.lookup("D1").is_unknown());
}

#[tokio::test]
async fn status_records_success_and_failures() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = MetadataCache::new(store.clone(), PRODUCER);

    cache.refresh().await.unwrap();
    let status = cache.status();
    assert!(status.last_success.is_some());
    assert_eq!(status.device_count, 5);
    assert_eq!(status.consecutive_failures, 0);

    store.fail_producer_lookups(true);
    let _ = cache.refresh().await;
    let _ = cache.refresh().await;
    let status = cache.status();
    assert_eq!(status.consecutive_failures, 2);
    assert!(status.last_error.is_some());
    assert_eq!(status.device_count, 5);
    assert!(status.last_attempt >= status.last_success);

    store.fail_producer_lookups(false);
    cache.refresh().await.unwrap();
    let status = cache.status();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn snapshot_held_by_reader_is_not_mutated_by_refresh() {
    let store = MemoryStore::new();
    store.put_producer(producer(PRODUCER, "Harbor Authority", &[("D1", "Crane A")]));
    let cache = MetadataCache::new(store.clone(), PRODUCER);
    cache.refresh().await.unwrap();

    let held = cache.snapshot();
    store.put_producer(producer(PRODUCER, "Harbor Authority", &[("D1", "Crane A (renamed)")]));
    cache.refresh().await.unwrap();

    assert_eq!(held.resolve("D1").name, "Crane A");
    assert_eq!(cache.lookup("D1").name, "Crane A (renamed)");
}

#[tokio::test(start_paused = true)]
async fn slow_refresh_of_older_roster_does_not_overwrite_newer_one() {
    let store = MemoryStore::new();
    store.put_producer(producer(PRODUCER, "Harbor Authority", &[("D1", "Crane A")]));
    let cache = Arc::new(MetadataCache::new(store.clone(), PRODUCER));

    // timer refresh reads the old roster and stalls before installing it
    store.set_producer_delay(Some(Duration::from_secs(10)));
    let slow = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.producer_calls.load(Ordering::SeqCst), 1);

    // roster upsert lands meanwhile and triggers its own refresh
    store.set_producer_delay(None);
    store.put_producer(producer(PRODUCER, "Harbor Authority", &[("D1", "Crane A (renamed)")]));
    cache.refresh().await.unwrap();

    slow.await.unwrap().unwrap();
    assert_eq!(store.producer_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.lookup("D1").name, "Crane A (renamed)");
}

#[tokio::test(start_paused = true)]
async fn refresher_runs_on_its_own_interval_and_stops_on_shutdown() {
    let store = MemoryStore::new();
    store.put_producer(five_device_roster());
    let cache = Arc::new(MetadataCache::new(store.clone(), PRODUCER));
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let refresher = MetadataRefresher::new(cache.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(refresher.run(shutdown_rx));

    // immediate tick is skipped
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.producer_calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(store.producer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.status().device_count, 5);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(store.producer_calls.load(Ordering::SeqCst), 2);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("refresher should stop")
        .expect("refresher task should complete");
}
