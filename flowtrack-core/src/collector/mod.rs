//! Collector (C7, §4.6): wires C2/C3/C4/C8 and runs the five loops described
//! in §4.6/§5. Grounded on
//! `ferrex-core::scan::orchestration::runtime::supervisor::OrchestratorRuntime`
//! for the overall shape — a handful of long-running loops sharing one
//! `CancellationToken`, `start`/`shutdown` methods, `JoinHandle`s collected
//! for a graceful, timeout-bounded stop.

mod config;
mod loops;
mod summary;

pub use config::CollectorConfig;
pub use summary::{ConnectionSummary, DestinationTotals};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowtrack_contracts::{
    AttributedFlow, EventFanout, FlowSource, FlowStore, ObserverError, Result,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::directory::DirectoryCache;
use crate::registry::FlowRegistry;

/// Snapshot of the Collector's operational state (ambient observability —
/// not a metrics backend, per `SPEC_FULL.md`'s ambient-stack section).
#[derive(Debug, Clone, Serialize)]
pub struct CollectorDiagnostics {
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    /// Cumulative event-channel drops reported by the flow source's own
    /// producer (§4.2, §9), `0` when no source is configured.
    pub dropped_event_count: u64,
    pub active_flow_count: usize,
    pub last_directory_refresh_at: Option<DateTime<Utc>>,
    pub last_directory_refresh_error: Option<String>,
}

pub struct Collector {
    config: CollectorConfig,
    directory: Arc<DirectoryCache>,
    source: Option<Arc<dyn FlowSource>>,
    store: Option<Arc<dyn FlowStore>>,
    fanout: Option<Arc<dyn EventFanout>>,
    registry: Arc<FlowRegistry>,
    shutdown: CancellationToken,
    handles: TokioMutex<Vec<tokio::task::JoinHandle<()>>>,
    degraded: Arc<AtomicBool>,
    degraded_reason: Arc<RwLock<Option<String>>>,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        directory: Arc<DirectoryCache>,
        source: Option<Arc<dyn FlowSource>>,
        store: Option<Arc<dyn FlowStore>>,
        fanout: Option<Arc<dyn EventFanout>>,
    ) -> Self {
        Self {
            config,
            directory,
            source,
            store,
            fanout,
            registry: Arc::new(FlowRegistry::new()),
            shutdown: CancellationToken::new(),
            handles: TokioMutex::new(Vec::new()),
            degraded: Arc::new(AtomicBool::new(false)),
            degraded_reason: Arc::new(RwLock::new(None)),
        }
    }

    /// Opens C3 (if present) and spawns all five loops (§4.6). If `open()`
    /// fails the Collector enters degraded mode and skips the event and
    /// snapshot loops (§4.2, §4.6) — the directory refresh and cleanup loops
    /// still run.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut handles = Vec::new();

        if let Some(source) = &self.source {
            if let Err(err) = source.open().await {
                warn!(error = %err, "flow source failed to open; running in degraded mode");
                self.degraded.store(true, Ordering::SeqCst);
                *self.degraded_reason.write() = Some(err.to_string());
            }
        } else {
            self.degraded.store(true, Ordering::SeqCst);
            *self.degraded_reason.write() = Some("no flow source configured".into());
        }

        handles.push(loops::spawn_directory_refresh_loop(
            Arc::clone(&self.directory),
            self.config.directory_refresh_interval,
            self.shutdown.clone(),
        ));

        if !self.degraded.load(Ordering::SeqCst) {
            let source = self.source.clone().expect("checked above");

            let (persist_tx, persist_rx) = mpsc::channel(self.config.event_channel_capacity);
            handles.push(loops::spawn_event_loop(
                Arc::clone(&source),
                Arc::clone(&self.directory),
                Arc::clone(&self.registry),
                self.fanout.clone(),
                persist_tx,
                self.shutdown.clone(),
            )?);

            handles.push(loops::spawn_snapshot_loop(
                Arc::clone(&source),
                Arc::clone(&self.directory),
                Arc::clone(&self.registry),
                self.config.snapshot_interval,
                self.shutdown.clone(),
            ));

            if let Some(store) = &self.store {
                let queue = Arc::new(TokioMutex::new(persist_rx));
                for worker_id in 0..self.config.persist_workers.max(1) {
                    handles.push(loops::spawn_persist_worker(
                        worker_id,
                        Arc::clone(store),
                        Arc::clone(&queue),
                        self.shutdown.clone(),
                    ));
                }
            }
        }

        if let Some(store) = &self.store {
            handles.push(loops::spawn_cleanup_loop(
                Arc::clone(store),
                self.config.retention_days,
                self.config.cleanup_interval,
                self.shutdown.clone(),
            ));
        }

        *self.handles.lock().await = handles;
        info!(degraded = !self.is_available(), "collector started");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        !self.degraded.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<String> {
        self.degraded_reason.read().clone()
    }

    /// Read path for active flows (§4.6): refreshes the directory if empty,
    /// forces a fresh kernel snapshot if a source is available, then returns
    /// the registry's filtered contents. This favors freshness over latency
    /// on every call (§9 open question — preserved as-is).
    #[instrument(skip(self))]
    pub async fn get_connections(&self, container: Option<&str>) -> Result<Vec<AttributedFlow>> {
        self.directory.refresh_if_empty().await?;

        if self.is_available() {
            if let Some(source) = &self.source {
                match source.snapshot().await {
                    Ok(raw_flows) => {
                        let mut next = std::collections::HashMap::with_capacity(raw_flows.len());
                        for raw in &raw_flows {
                            let previous = self.registry.get(&raw.id);
                            if let Some(attributed) =
                                crate::attribution::attribute(raw, &self.directory, previous.as_ref())
                            {
                                next.insert(attributed.flow_id().to_string(), attributed);
                            }
                        }
                        self.registry.replace_all(next);
                    }
                    Err(err) => {
                        warn!(error = %err, "on-demand snapshot failed; serving last known state");
                    }
                }
            }
        }

        Ok(self.registry.snapshot_filtered(container))
    }

    pub async fn get_summary(&self, container: &str) -> Result<ConnectionSummary> {
        if container.trim().is_empty() {
            return Err(ObserverError::InvalidArgument(
                "container is required".into(),
            ));
        }
        let flows = self.get_connections(Some(container)).await?;
        Ok(summary::summarize(Some(container), &flows))
    }

    pub fn diagnostics(&self) -> CollectorDiagnostics {
        CollectorDiagnostics {
            degraded: !self.is_available(),
            degraded_reason: self.error(),
            dropped_event_count: self
                .source
                .as_ref()
                .map(|source| source.dropped_event_count())
                .unwrap_or(0),
            active_flow_count: self.registry.size(),
            last_directory_refresh_at: self.directory.last_refresh_at(),
            last_directory_refresh_error: self.directory.last_refresh_error(),
        }
    }

    /// Idempotent graceful shutdown (§5): cancels the shared token, closes
    /// C3, and awaits every loop's `JoinHandle` with a bounded timeout,
    /// matching `OrchestratorRuntime::shutdown`'s pattern.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();

        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            match tokio::time::timeout(Duration::from_secs(30), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "collector loop task panicked"),
                Err(_) => warn!("collector loop did not shut down within timeout"),
            }
        }

        if let Some(source) = &self.source {
            source.close().await?;
        }

        info!("collector stopped");
        Ok(())
    }
}
