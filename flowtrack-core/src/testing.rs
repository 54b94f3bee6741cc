//! In-memory fixtures for C1 and C3, used by tests and by
//! `flowtrack-collectord` in place of a real kernel/orchestrator backend,
//! which is out of scope for this workspace (§1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flowtrack_contracts::{
    DirectoryEntry, FlowEventStream, FlowSource, InventoryProvider, ObserverError, RawFlow, Result,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Serves a fixed `{name -> ip}` table, updatable at runtime for tests that
/// exercise directory refresh behavior.
#[derive(Debug, Default)]
pub struct StaticInventoryProvider {
    entries: RwLock<Vec<DirectoryEntry>>,
}

impl StaticInventoryProvider {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn set(&self, entries: Vec<DirectoryEntry>) {
        *self.entries.write() = entries;
    }
}

#[async_trait]
impl InventoryProvider for StaticInventoryProvider {
    async fn list(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.entries.read().clone())
    }
}

/// A `FlowSource` with no real kernel facility behind it: `open()` always
/// returns [`ObserverError::Unsupported`], which puts the Collector into
/// degraded mode (§4.2, §4.6). Used as the default source in
/// `flowtrack-collectord` until a platform-specific backend is wired in.
#[derive(Debug, Default)]
pub struct NullFlowSource;

#[async_trait]
impl FlowSource for NullFlowSource {
    async fn open(&self) -> Result<()> {
        Err(ObserverError::Unsupported(
            "no kernel connection-tracking facility wired into this build".into(),
        ))
    }

    fn events(&self) -> Result<FlowEventStream> {
        Err(ObserverError::Unsupported(
            "no kernel connection-tracking facility wired into this build".into(),
        ))
    }

    async fn snapshot(&self) -> Result<Vec<RawFlow>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn dropped_event_count(&self) -> u64 {
        0
    }
}

/// A scriptable `FlowSource` for tests and demos: `open`/`close` always
/// succeed, `events()` replays whatever was queued via
/// [`ScriptedFlowSource::push`], and `snapshot()` returns the last value set
/// with [`ScriptedFlowSource::set_snapshot`]. `push` mirrors the producer
/// contract in `FlowEventStream`'s docs: a full channel drops the event and
/// increments [`ScriptedFlowSource::dropped_event_count`] rather than
/// blocking.
#[derive(Debug)]
pub struct ScriptedFlowSource {
    sender: mpsc::Sender<RawFlow>,
    receiver: Arc<RwLock<Option<mpsc::Receiver<RawFlow>>>>,
    snapshot: RwLock<Vec<RawFlow>>,
    dropped: AtomicU64,
}

impl ScriptedFlowSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(RwLock::new(Some(receiver))),
            snapshot: RwLock::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attempts to enqueue `flow` without blocking; drops and counts it if
    /// the channel is full.
    pub fn push(&self, flow: RawFlow) {
        if self.sender.try_send(flow).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_snapshot(&self, flows: Vec<RawFlow>) {
        *self.snapshot.write() = flows;
    }
}

impl Default for ScriptedFlowSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl FlowSource for ScriptedFlowSource {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    fn events(&self) -> Result<FlowEventStream> {
        let receiver = self
            .receiver
            .write()
            .take()
            .ok_or_else(|| ObserverError::Unavailable("event stream already taken".into()))?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    async fn snapshot(&self) -> Result<Vec<RawFlow>> {
        Ok(self.snapshot.read().clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn dropped_event_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
