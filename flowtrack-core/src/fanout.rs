//! Reference [`EventFanout`] implementation (C8, §4.7).
//!
//! Grounded on `ferrex-server`'s `infra/scan/media_event_bus.rs`: a shared
//! broadcast point feeding per-consumer bounded queues. That bus keeps a
//! fixed-size history ring for late joiners; this fan-out has no "late
//! joiner" concept (subscribers only ever see events published after they
//! subscribe, per §4.7), so it trades the history ring for per-subscriber
//! filtering instead.

use dashmap::DashMap;
use flowtrack_contracts::{EventFanout, LifecycleEvent, Subscription, SubscriptionFilter, SubscriptionId};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    filter: SubscriptionFilter,
    sender: mpsc::Sender<LifecycleEvent>,
}

/// In-process fan-out: every subscriber gets its own bounded `mpsc` queue;
/// `publish` is a synchronous fan-out loop using `try_send`, so a full queue
/// drops the event for that subscriber instead of blocking the Collector
/// (§5: "slow subscribers drop events rather than backpressure the
/// Collector").
#[derive(Default)]
pub struct InMemoryEventFanout {
    subscribers: DashMap<SubscriptionId, Subscriber>,
    buffer: usize,
}

impl InMemoryEventFanout {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl EventFanout for InMemoryEventFanout {
    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, Subscriber { filter, sender });
        Subscription { id, events: receiver }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(&id);
    }

    fn publish(&self, event: LifecycleEvent) {
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.filter.matches(&event) {
                continue;
            }
            if subscriber.sender.try_send(event.clone()).is_err() {
                trace!(subscription = %entry.key(), "dropping lifecycle event for slow subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowtrack_contracts::{Direction, FlowEventKind, Protocol, RawFlow};
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    fn sample_event(container: &str) -> LifecycleEvent {
        let now = Utc::now();
        LifecycleEvent {
            kind: FlowEventKind::New,
            published_at: now,
            flow: flowtrack_contracts::AttributedFlow {
                raw: RawFlow {
                    id: "1".into(),
                    kind: FlowEventKind::New,
                    protocol: Protocol::Tcp,
                    src_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
                    src_port: 1,
                    dst_ip: Ipv4Addr::new(8, 8, 8, 8).into(),
                    dst_port: 2,
                    tcp_state: None,
                    bytes_orig: 0,
                    bytes_reply: 0,
                    packets_orig: 0,
                    packets_reply: 0,
                    timeout_seconds: 30,
                    observed_at: now,
                },
                container_name: container.to_string(),
                container_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
                direction: Direction::Egress,
                first_seen: now,
                last_seen: now,
                bytes_sent: 0,
                bytes_received: 0,
                packets_sent: 0,
                packets_received: 0,
            },
        }
    }

    #[tokio::test]
    async fn subscriber_only_receives_matching_events() {
        let bus = InMemoryEventFanout::new();
        let mut names = HashSet::new();
        names.insert("a".to_string());
        let mut sub = bus.subscribe(SubscriptionFilter {
            container_names: Some(names),
            event_types: None,
        });

        bus.publish(sample_event("b"));
        bus.publish(sample_event("a"));

        let received = sub.events.recv().await.unwrap();
        assert_eq!(received.flow.container_name, "a");
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryEventFanout::new();
        let sub = bus.subscribe(SubscriptionFilter::default());
        bus.unsubscribe(sub.id);
        bus.publish(sample_event("a"));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
