//! Trait surfaces and domain model shared by the container network traffic
//! observer. No component in this crate performs I/O itself — it only
//! describes the contracts that `flowtrack-core` implements and drives.

pub mod error;
pub mod fanout;
pub mod flow_source;
pub mod flow_store;
pub mod inventory;
pub mod model;

pub use error::{ObserverError, Result};
pub use fanout::{EventFanout, LifecycleEvent, Subscription, SubscriptionFilter, SubscriptionId};
pub use flow_source::{FlowEventStream, FlowSource};
pub use flow_store::{
    AggregateQuery, FlowStore, HistoryQuery, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
pub use inventory::InventoryProvider;
pub use model::{
    AggregateBucket, AttributedFlow, Direction, DirectoryEntry, FlowEventKind, Interval,
    PersistedFlow, Protocol, RawFlow, TcpState,
};
