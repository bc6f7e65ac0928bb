use std::time::Duration;

use chrono::Utc;
use port_feed::Broadcaster;
use port_feed::DocumentSink;
use port_feed::FeedNodeBuilder;
use port_feed::Reading;
use port_feed::SledDocumentStore;
use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;

use crate::commons::free_listen_addr;
use crate::commons::node_config;
use crate::commons::url;
use crate::commons::wait_for_node_ready;
use crate::commons::wait_until;
use crate::commons::WsSubscriber;
use crate::enable_logger;

const FRAME_WAIT: Duration = Duration::from_secs(5);

/// Reads frames until `expected` events arrived.
async fn collect_events(
    ws: &mut WsSubscriber,
    expected: usize,
) -> Vec<Value> {
    let mut events = Vec::new();
    while events.len() < expected {
        let frame = ws.next_text_within(FRAME_WAIT).await.expect("db_update frame");
        let frame: Value = serde_json::from_str(&frame).expect("json frame");
        assert_eq!(frame["event"], "db_update");
        let data = frame["data"].as_array().expect("data array");
        assert!(!data.is_empty(), "empty batches are never pushed");
        events.extend(data.iter().cloned());
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingested_readings_reach_subscriber_enriched() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let addr = free_listen_addr();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let node = FeedNodeBuilder::new(node_config(dir.path(), addr), shutdown_rx)
        .build()
        .await
        .unwrap();
    let hub = node.hub();
    let handle = tokio::spawn(node.run());
    let client = reqwest::Client::new();
    wait_for_node_ready(&client, addr).await;

    let res = client
        .put(url(addr, "/api/producers/port-operator"))
        .json(&json!({
            "ownerName": "Harbor Authority",
            "devices": [{ "deviceId": "D1", "name": "Crane A" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let mut ws = WsSubscriber::connect(addr).await.unwrap();
    wait_until(|| hub.subscriber_count() == 1).await;

    let res = client
        .post(url(addr, "/api/readings"))
        .json(&json!([
            { "id": "r-1", "deviceId": "D1", "powerKw": 12 },
            { "id": "r-2", "deviceId": "D9" }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);

    let events = collect_events(&mut ws, 2).await;
    assert_eq!(events[0]["id"], "r-1");
    assert_eq!(events[0]["deviceName"], "Crane A");
    assert_eq!(events[0]["ownerName"], "Harbor Authority");
    assert_eq!(events[0]["powerKw"], 12);
    assert_eq!(events[1]["id"], "r-2");
    assert_eq!(events[1]["deviceName"], "Unknown");
    assert_eq!(events[1]["ownerName"], "Unknown");

    // nothing is delivered twice
    assert!(ws.next_text_within(Duration::from_millis(300)).await.is_none());

    let res = client.get(url(addr, "/status")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["feed"]["dedup_window_len"], 2);
    assert_eq!(report["metadata"]["device_count"], 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("node stops")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readings_written_before_start_are_not_replayed() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let addr = free_listen_addr();
    let config = node_config(dir.path(), addr);

    {
        let store = SledDocumentStore::open(&config.store.path, 10).unwrap();
        let stale = Reading::new("stale", "D1", Utc::now() - chrono::Duration::minutes(1));
        store.insert_reading(&stale).await.unwrap();
        store.flush().unwrap();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let node = FeedNodeBuilder::new(config, shutdown_rx).build().await.unwrap();
    let hub = node.hub();
    let handle = tokio::spawn(node.run());
    let client = reqwest::Client::new();
    wait_for_node_ready(&client, addr).await;

    let mut ws = WsSubscriber::connect(addr).await.unwrap();
    wait_until(|| hub.subscriber_count() == 1).await;

    let res = client
        .post(url(addr, "/api/readings"))
        .json(&json!({ "id": "fresh", "deviceId": "D1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);

    let events = collect_events(&mut ws, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], "fresh");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("node stops")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operational_routes_and_shutdown() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let addr = free_listen_addr();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let node = FeedNodeBuilder::new(node_config(dir.path(), addr), shutdown_rx)
        .build()
        .await
        .unwrap();
    let hub = node.hub();
    let handle = tokio::spawn(node.run());
    let client = reqwest::Client::new();
    wait_for_node_ready(&client, addr).await;

    let res = client.get(url(addr, "/health")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let health: Value = res.json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let res = client.get(url(addr, "/metrics")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert!(res.text().await.unwrap().contains("feed_poll_duration_ms"));

    let res = client.get(url(addr, "/status")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["producer_id"], "port-operator");
    assert_eq!(report["metadata"]["last_error"], "Producer port-operator not found");

    let mut ws = WsSubscriber::connect(addr).await.unwrap();
    wait_until(|| hub.subscriber_count() == 1).await;

    shutdown_tx.send(()).unwrap();
    assert!(ws.closed_within(Duration::from_secs(5)).await);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("node stops")
        .unwrap()
        .unwrap();
    assert_eq!(hub.subscriber_count(), 0);
}
