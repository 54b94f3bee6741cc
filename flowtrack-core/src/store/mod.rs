//! [`FlowStore`](flowtrack_contracts::FlowStore) implementations (C4, §4.3).

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryFlowStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresFlowStore;
