//! The five concurrent loops driven by [`super::Collector`] (§4.6, §5): all
//! share one [`CancellationToken`], matching the worker-pool shutdown
//! pattern in `ferrex-core::scan::orchestration::runtime::supervisor`
//! (`spawn_worker_pool`/`spawn_housekeeper`/`shutdown`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flowtrack_contracts::{EventFanout, FlowSource, FlowStore, LifecycleEvent, PersistedFlow};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::attribution::attribute;
use crate::directory::DirectoryCache;
use crate::registry::FlowRegistry;

#[instrument(skip_all)]
pub fn spawn_directory_refresh_loop(
    directory: Arc<DirectoryCache>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("directory refresh loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = directory.refresh().await {
                        warn!(error = %err, "directory refresh loop iteration failed");
                    }
                }
            }
        }
    })
}

/// Reads `source.events()` (§4.2), attributes each [`flowtrack_contracts::RawFlow`]
/// via C5, upserts or evicts C6, publishes a lifecycle notification, and
/// enqueues a persist task on DESTROY (§4.6 loop 2).
#[instrument(skip_all)]
pub fn spawn_event_loop(
    source: Arc<dyn FlowSource>,
    directory: Arc<DirectoryCache>,
    registry: Arc<FlowRegistry>,
    fanout: Option<Arc<dyn EventFanout>>,
    persist_tx: mpsc::Sender<PersistedFlow>,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, flowtrack_contracts::ObserverError> {
    let mut events = source.events()?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("event loop shutting down");
                    break;
                }
                next = events.next() => {
                    let Some(raw) = next else {
                        debug!("event stream closed");
                        break;
                    };
                    let kind = raw.kind;
                    let previous = registry.get(&raw.id);
                    let Some(attributed) = attribute(&raw, &directory, previous.as_ref()) else {
                        continue;
                    };

                    match kind {
                        flowtrack_contracts::FlowEventKind::New
                        | flowtrack_contracts::FlowEventKind::Update => {
                            registry.upsert(attributed.clone());
                        }
                        flowtrack_contracts::FlowEventKind::Destroy => {
                            registry.remove(&raw.id);
                            let persisted = PersistedFlow::from_attributed(&attributed);
                            if persist_tx.send(persisted).await.is_err() {
                                warn!("persist queue closed; dropping completed flow");
                            }
                        }
                    }

                    if let Some(fanout) = &fanout {
                        fanout.publish(LifecycleEvent {
                            kind,
                            flow: attributed,
                            published_at: chrono::Utc::now(),
                        });
                    }
                }
            }
        }
    }))
}

/// Periodically replaces C6's contents with the attributed set derived from
/// a fresh `source.snapshot()` (§4.6 loop 3). Authoritative: reconciles any
/// drift from dropped events without treating evictions as DESTROYs (§8
/// scenario 4).
#[instrument(skip_all)]
pub fn spawn_snapshot_loop(
    source: Arc<dyn FlowSource>,
    directory: Arc<DirectoryCache>,
    registry: Arc<FlowRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("snapshot loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match source.snapshot().await {
                        Ok(raw_flows) => {
                            let next = reconcile(&raw_flows, &directory, &registry);
                            let count = next.len();
                            registry.replace_all(next);
                            debug!(active = count, "snapshot reconciliation complete");
                        }
                        Err(err) => warn!(error = %err, "snapshot loop iteration failed"),
                    }
                }
            }
        }
    })
}

fn reconcile(
    raw_flows: &[flowtrack_contracts::RawFlow],
    directory: &DirectoryCache,
    registry: &FlowRegistry,
) -> HashMap<String, flowtrack_contracts::AttributedFlow> {
    let mut next = HashMap::with_capacity(raw_flows.len());
    for raw in raw_flows {
        let previous = registry.get(&raw.id);
        if let Some(attributed) = attribute(raw, directory, previous.as_ref()) {
            next.insert(attributed.flow_id().to_string(), attributed);
        }
    }
    next
}

#[instrument(skip_all)]
pub fn spawn_cleanup_loop(
    store: Arc<dyn FlowStore>,
    retention_days: u32,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("cleanup loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match store.cleanup(retention_days).await {
                        Ok(removed) => debug!(removed, "cleanup loop iteration complete"),
                        Err(err) => warn!(error = %err, "cleanup loop iteration failed"),
                    }
                }
            }
        }
    })
}

/// One of the bounded persist workers (§4.6 loop 5, §5: "worker pool for
/// persistence"). Workers share one receiver behind a `tokio::sync::Mutex`
/// so the pool's concurrency is bounded by the number of workers spawned,
/// not by the channel.
#[instrument(skip_all, fields(worker_id))]
pub fn spawn_persist_worker(
    worker_id: usize,
    store: Arc<dyn FlowStore>,
    queue: Arc<TokioMutex<mpsc::Receiver<PersistedFlow>>>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut guard = queue.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(worker_id, "persist worker shutting down");
                    break;
                }
                item = guard.recv() => {
                    drop(guard);
                    match item {
                        Some(flow) => {
                            if let Err(err) = store.save_completed(&flow).await {
                                warn!(worker_id, flow_id = %flow.flow_id, error = %err, "failed to persist completed flow");
                            }
                        }
                        None => {
                            debug!(worker_id, "persist queue closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}
