//! Attribution Engine (C5, §4.4): joins a [`RawFlow`] against the directory
//! cache to produce a direction-tagged [`AttributedFlow`], or drops it.

use flowtrack_contracts::{AttributedFlow, Direction, FlowEventKind, RawFlow};

use crate::directory::DirectoryCache;

/// Applies the source-first attribution rule (§4.4):
///
/// 1. If `src_ip` is in the directory, the flow is EGRESS from that
///    container.
/// 2. Else if `dst_ip` is in the directory, the flow is INGRESS to that
///    container.
/// 3. Else the flow is dropped.
///
/// Source-first ordering ensures an intra-container flow (both endpoints in
/// the directory) is counted exactly once, as egress from the initiator
/// (§4.4, §8 scenario 6).
///
/// `previous` carries forward `first_seen`/cumulative identity across
/// UPDATE events for the same flow id (§3 lifecycle: "mutated by subsequent
/// UPDATEs").
pub fn attribute(
    raw: &RawFlow,
    directory: &DirectoryCache,
    previous: Option<&AttributedFlow>,
) -> Option<AttributedFlow> {
    let (container_name, container_ip, direction) =
        if let Some(name) = directory.lookup_by_ip(raw.src_ip) {
            (name, raw.src_ip, Direction::Egress)
        } else if let Some(name) = directory.lookup_by_ip(raw.dst_ip) {
            (name, raw.dst_ip, Direction::Ingress)
        } else {
            return None;
        };

    let (bytes_sent, bytes_received, packets_sent, packets_received) = match direction {
        Direction::Egress => (
            raw.bytes_orig,
            raw.bytes_reply,
            raw.packets_orig,
            raw.packets_reply,
        ),
        Direction::Ingress => (
            raw.bytes_reply,
            raw.bytes_orig,
            raw.packets_reply,
            raw.packets_orig,
        ),
    };

    let first_seen = previous.map(|p| p.first_seen).unwrap_or(raw.observed_at);

    Some(AttributedFlow {
        raw: raw.clone(),
        container_name,
        container_ip,
        direction,
        first_seen,
        last_seen: raw.observed_at,
        bytes_sent,
        bytes_received,
        packets_sent,
        packets_received,
    })
}

/// Convenience for callers that only care whether this event would be
/// attributed and in which direction, without allocating a full
/// [`AttributedFlow`] (used by tests and by the Collector's event-kind
/// branch in §4.6 loop 2, which needs `FlowEventKind` alongside the
/// attribution outcome).
pub fn event_kind(raw: &RawFlow) -> FlowEventKind {
    raw.kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use flowtrack_contracts::{DirectoryEntry, InventoryProvider, Protocol, Result};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticInventory(Vec<DirectoryEntry>);

    #[async_trait]
    impl InventoryProvider for StaticInventory {
        async fn list(&self) -> Result<Vec<DirectoryEntry>> {
            Ok(self.0.clone())
        }
    }

    async fn directory_with(entries: Vec<(&str, &str)>) -> DirectoryCache {
        let entries = entries
            .into_iter()
            .map(|(name, ip)| DirectoryEntry {
                name: name.to_string(),
                ip: ip.parse().unwrap(),
            })
            .collect();
        let cache = DirectoryCache::new(
            Arc::new(StaticInventory(entries)),
            None,
            Duration::from_secs(30),
        );
        cache.refresh().await.unwrap();
        cache
    }

    fn raw_flow(src: &str, sport: u16, dst: &str, dport: u16, orig: u64, reply: u64) -> RawFlow {
        RawFlow {
            id: "1".into(),
            kind: FlowEventKind::New,
            protocol: Protocol::Tcp,
            src_ip: src.parse().unwrap(),
            src_port: sport,
            dst_ip: dst.parse().unwrap(),
            dst_port: dport,
            tcp_state: None,
            bytes_orig: orig,
            bytes_reply: reply,
            packets_orig: 1,
            packets_reply: 1,
            timeout_seconds: 120,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn egress_attribution() {
        let dir = directory_with(vec![("a", "10.0.0.5")]).await;
        let raw = raw_flow("10.0.0.5", 40000, "93.184.216.34", 443, 1200, 3400);

        let flow = attribute(&raw, &dir, None).unwrap();
        assert_eq!(flow.container_name, "a");
        assert_eq!(flow.direction, Direction::Egress);
        assert_eq!(flow.bytes_sent, 1200);
        assert_eq!(flow.bytes_received, 3400);
    }

    #[tokio::test]
    async fn ingress_attribution() {
        let dir = directory_with(vec![("b", "10.0.0.6")]).await;
        let raw = raw_flow("10.0.0.1", 55555, "10.0.0.6", 22, 800, 200);

        let flow = attribute(&raw, &dir, None).unwrap();
        assert_eq!(flow.container_name, "b");
        assert_eq!(flow.direction, Direction::Ingress);
        assert_eq!(flow.bytes_sent, 200);
        assert_eq!(flow.bytes_received, 800);
    }

    #[tokio::test]
    async fn non_container_flow_is_dropped() {
        let dir = directory_with(vec![]).await;
        let raw = raw_flow("8.8.8.8", 1, "1.1.1.1", 2, 10, 10);
        assert!(attribute(&raw, &dir, None).is_none());
    }

    #[tokio::test]
    async fn intra_container_tie_break_favors_source() {
        let dir = directory_with(vec![("a", "10.0.0.5"), ("b", "10.0.0.6")]).await;
        let raw = raw_flow("10.0.0.5", 1000, "10.0.0.6", 2000, 5, 5);

        let flow = attribute(&raw, &dir, None).unwrap();
        assert_eq!(flow.container_name, "a");
        assert_eq!(flow.direction, Direction::Egress);
    }
}
