//! Flow Registry (C6, §4.5): an in-memory index of currently active
//! attributed flows keyed by flow identifier.
//!
//! Modeled on the same build-aside-then-swap pattern as
//! [`crate::directory::DirectoryCache`] (itself grounded on
//! `ferrex-server`'s `infra/cache/movie_batches_cache.rs`): a single
//! `RwLock<HashMap<..>>` guarantees [`FlowRegistry::replace_all`] is atomic
//! with respect to readers (§4.5), which a `DashMap::clear()` followed by
//! per-entry reinserts cannot guarantee — a concurrent reader could observe
//! a transiently empty or partially-rebuilt table.

use std::collections::HashMap;

use flowtrack_contracts::AttributedFlow;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: RwLock<HashMap<String, AttributedFlow>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, flow: AttributedFlow) {
        self.flows.write().insert(flow.flow_id().to_string(), flow);
    }

    pub fn remove(&self, id: &str) -> Option<AttributedFlow> {
        self.flows.write().remove(id)
    }

    /// Atomically replaces the entire table with `next` (§4.5: "must be
    /// atomic with respect to readers"). Used by the snapshot loop to
    /// reconcile drift — entries absent from `next` are evicted without
    /// being treated as a DESTROY (§8 scenario 4).
    pub fn replace_all(&self, next: HashMap<String, AttributedFlow>) {
        *self.flows.write() = next;
    }

    pub fn get(&self, id: &str) -> Option<AttributedFlow> {
        self.flows.read().get(id).cloned()
    }

    pub fn snapshot_filtered(&self, container: Option<&str>) -> Vec<AttributedFlow> {
        self.flows
            .read()
            .values()
            .filter(|flow| match container {
                Some(name) => flow.container_name == name,
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.flows.read().len()
    }
}
