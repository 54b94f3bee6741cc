use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::model::RawFlow;

/// Stream of live flow events (§4.2). Implementations back this with a
/// bounded channel (default capacity 1,024); a full channel causes the
/// producer to drop the event and increment its own dropped-event counter
/// rather than block — the snapshot loop (§4.6 loop 3) is the reconciliation
/// path, not retransmission (§9). [`FlowSource::dropped_event_count`] exposes
/// that counter to the Collector.
pub type FlowEventStream = Pin<Box<dyn Stream<Item = RawFlow> + Send>>;

/// Abstract kernel connection-tracking source (§4.2, C3).
///
/// State machine: `Opened → Running → Closed`. `open()` transitions out of
/// `Opened`; `close()` cancels the live subscription, closes the event
/// stream, and releases resources, moving to `Closed`. `snapshot()` must be
/// usable concurrently with a live subscription — implementations must not
/// share a single kernel handle between the two (§9: "dual connections to
/// the kernel source").
#[async_trait]
pub trait FlowSource: Send + Sync {
    /// Opens the underlying kernel facility. Returns
    /// [`crate::ObserverError::Unsupported`] if this platform has no
    /// conntrack facility; the Collector then runs in degraded mode (§4.2,
    /// §4.6).
    async fn open(&self) -> Result<()>;

    /// Subscribes to the live event feed. May be called once per
    /// subscription lifetime; callers that need another subscription after
    /// dropping the stream should call this again.
    fn events(&self) -> Result<FlowEventStream>;

    /// Returns a full dump of the current kernel flow table. Safe to call
    /// concurrently with an open `events()` stream.
    async fn snapshot(&self) -> Result<Vec<RawFlow>>;

    /// Cancels subscriptions, closes the event stream, and releases
    /// resources. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Cumulative count of events the producer has dropped because the
    /// bounded event channel was full (§4.2, §9: "producer drops on full
    /// with a counter increment"). Surfaced via
    /// [`crate::ObserverError`]-free read through `Collector::diagnostics()`.
    fn dropped_event_count(&self) -> u64;
}
