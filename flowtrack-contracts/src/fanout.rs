use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{AttributedFlow, FlowEventKind};

/// Opaque handle returned by [`EventFanout::subscribe`].
pub type SubscriptionId = Uuid;

/// A lifecycle notification published by the Collector (§4.6, §4.7).
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub kind: FlowEventKind,
    pub flow: AttributedFlow,
    pub published_at: DateTime<Utc>,
}

/// Subscriber-side filter (§4.7): "Filters include resource-type and (for
/// traffic) container-name and event-type sets." Only the traffic resource
/// exists today; `resource` is kept so a future resource type can reuse the
/// same fan-out without a breaking change.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub container_names: Option<HashSet<String>>,
    pub event_types: Option<HashSet<FlowEventKind>>,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        if let Some(names) = &self.container_names {
            if !names.contains(&event.flow.container_name) {
                return false;
            }
        }
        if let Some(kinds) = &self.event_types {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        true
    }
}

/// A live subscription: `events` yields filtered [`LifecycleEvent`]s until
/// the subscriber drops it or calls [`EventFanout::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: tokio::sync::mpsc::Receiver<LifecycleEvent>,
}

/// Receives lifecycle notifications from the Collector and delivers them to
/// subscribers (§4.7, C8). Delivery is best-effort per subscriber with a
/// bounded per-subscriber buffer; a slow subscriber drops events rather than
/// backpressuring the publisher (§5).
pub trait EventFanout: Send + Sync {
    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Delivers `event` to every matching subscriber. Never blocks the
    /// caller — the Collector does no per-subscriber work (§4.6).
    fn publish(&self, event: LifecycleEvent);
}
