//! End-to-end scenarios driving the full [`Collector`] against in-memory
//! fixtures, each covering a distinct step of the flow lifecycle: new flow
//! attribution, completion, drift reconciliation, and degraded-mode reads.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flowtrack_contracts::{DirectoryEntry, FlowEventKind, FlowStore, HistoryQuery, Protocol, RawFlow};
use flowtrack_core::store::InMemoryFlowStore;
use flowtrack_core::testing::{ScriptedFlowSource, StaticInventoryProvider};
use flowtrack_core::{Collector, CollectorConfig, DirectoryCache};

fn raw_flow(id: &str, kind: FlowEventKind, src: &str, dst: &str, orig: u64, reply: u64) -> RawFlow {
    RawFlow {
        id: id.to_string(),
        kind,
        protocol: Protocol::Tcp,
        src_ip: src.parse().unwrap(),
        src_port: 40000,
        dst_ip: dst.parse().unwrap(),
        dst_port: 443,
        tcp_state: None,
        bytes_orig: orig,
        bytes_reply: reply,
        packets_orig: 1,
        packets_reply: 1,
        timeout_seconds: 120,
        observed_at: Utc::now(),
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within timeout");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn fast_config() -> CollectorConfig {
    CollectorConfig {
        snapshot_interval: Duration::from_secs(3600),
        cleanup_interval: Duration::from_secs(3600),
        directory_refresh_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

/// DESTROY persists a completed flow with `started_at` taken from the NEW
/// event and `duration_seconds` computed from the gap to the DESTROY event.
#[tokio::test]
async fn destroy_event_persists_completed_flow_with_duration() {
    let inventory = Arc::new(StaticInventoryProvider::new(vec![DirectoryEntry {
        name: "web".into(),
        ip: Ipv4Addr::new(10, 0, 0, 5).into(),
    }]));
    let directory = Arc::new(DirectoryCache::new(
        inventory,
        None,
        Duration::from_secs(3600),
    ));
    directory.refresh().await.unwrap();

    let source = Arc::new(ScriptedFlowSource::default());
    let store = Arc::new(InMemoryFlowStore::new());

    let collector = Collector::new(
        fast_config(),
        Arc::clone(&directory),
        Some(source.clone() as Arc<dyn flowtrack_contracts::FlowSource>),
        Some(store.clone() as Arc<dyn FlowStore>),
        None,
    );
    collector.start().await.unwrap();
    assert!(collector.is_available());

    source.push(raw_flow(
        "flow-1",
        FlowEventKind::New,
        "10.0.0.5",
        "93.184.216.34",
        0,
        0,
    ));
    source.push(raw_flow(
        "flow-1",
        FlowEventKind::Destroy,
        "10.0.0.5",
        "93.184.216.34",
        1500,
        9000,
    ));

    wait_until(
        || {
            let registry_empty = collector.diagnostics().active_flow_count == 0;
            registry_empty
        },
        Duration::from_secs(2),
    )
    .await;

    let query = HistoryQuery {
        container: "web".into(),
        start: Utc::now() - chrono::Duration::hours(1),
        end: Utc::now() + chrono::Duration::hours(1),
        dest_ip: None,
        dest_port: None,
        offset: 0,
        limit: 0,
    }
    .normalized();

    let (rows, total) = wait_for_history(&store, query).await;
    assert_eq!(total, 1);
    let row = &rows[0];
    assert_eq!(row.flow_id, "flow-1");
    assert_eq!(row.bytes_sent, 1500);
    assert_eq!(row.bytes_received, 9000);
    assert!(row.duration_seconds.is_some());

    collector.stop().await.unwrap();
}

async fn wait_for_history(
    store: &InMemoryFlowStore,
    query: HistoryQuery,
) -> (Vec<flowtrack_contracts::PersistedFlow>, u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let (rows, total) = store.query_history(query.clone()).await.unwrap();
        if total > 0 || tokio::time::Instant::now() >= deadline {
            return (rows, total);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A snapshot that drops a previously-seen flow id evicts it from the
/// registry without synthesizing a DESTROY or persisting anything — drift
/// reconciliation is silent (lifecycle §3, §8).
#[tokio::test]
async fn snapshot_reconciliation_evicts_without_persisting() {
    let inventory = Arc::new(StaticInventoryProvider::new(vec![DirectoryEntry {
        name: "web".into(),
        ip: Ipv4Addr::new(10, 0, 0, 5).into(),
    }]));
    let directory = Arc::new(DirectoryCache::new(
        inventory,
        None,
        Duration::from_secs(3600),
    ));
    directory.refresh().await.unwrap();

    let source = Arc::new(ScriptedFlowSource::default());
    source.set_snapshot(vec![raw_flow(
        "flow-a",
        FlowEventKind::New,
        "10.0.0.5",
        "93.184.216.34",
        10,
        20,
    )]);
    let store = Arc::new(InMemoryFlowStore::new());

    let mut config = fast_config();
    config.snapshot_interval = Duration::from_millis(30);

    let collector = Collector::new(
        config,
        Arc::clone(&directory),
        Some(source.clone() as Arc<dyn flowtrack_contracts::FlowSource>),
        Some(store.clone() as Arc<dyn FlowStore>),
        None,
    );
    collector.start().await.unwrap();

    wait_until(
        || collector.diagnostics().active_flow_count == 1,
        Duration::from_secs(2),
    )
    .await;

    source.set_snapshot(vec![]);

    wait_until(
        || collector.diagnostics().active_flow_count == 0,
        Duration::from_secs(2),
    )
    .await;

    let query = HistoryQuery {
        container: "web".into(),
        start: Utc::now() - chrono::Duration::hours(1),
        end: Utc::now() + chrono::Duration::hours(1),
        dest_ip: None,
        dest_port: None,
        offset: 0,
        limit: 0,
    }
    .normalized();
    let (_, total) = store.query_history(query).await.unwrap();
    assert_eq!(total, 0, "evicted flow must not be persisted");

    collector.stop().await.unwrap();
}

/// A flow between two unrelated external hosts is dropped by C5 and never
/// reaches the registry or the store.
#[tokio::test]
async fn flow_outside_the_directory_is_dropped() {
    let inventory = Arc::new(StaticInventoryProvider::default());
    let directory = Arc::new(DirectoryCache::new(
        inventory,
        None,
        Duration::from_secs(3600),
    ));
    directory.refresh().await.unwrap();

    let source = Arc::new(ScriptedFlowSource::default());
    let collector = Collector::new(
        fast_config(),
        Arc::clone(&directory),
        Some(source.clone() as Arc<dyn flowtrack_contracts::FlowSource>),
        None,
        None,
    );
    collector.start().await.unwrap();

    source.push(raw_flow(
        "flow-x",
        FlowEventKind::New,
        "8.8.8.8",
        "1.1.1.1",
        10,
        10,
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.diagnostics().active_flow_count, 0);

    collector.stop().await.unwrap();
}

/// With no flow source configured the Collector starts in degraded mode and
/// `get_connections` still succeeds, returning an empty set.
#[tokio::test]
async fn degraded_mode_without_a_source_serves_empty_results() {
    let inventory = Arc::new(StaticInventoryProvider::default());
    let directory = Arc::new(DirectoryCache::new(
        inventory,
        None,
        Duration::from_secs(3600),
    ));

    let collector = Collector::new(fast_config(), directory, None, None, None);
    collector.start().await.unwrap();

    assert!(!collector.is_available());
    let connections = collector.get_connections(None).await.unwrap();
    assert!(connections.is_empty());

    collector.stop().await.unwrap();
}
