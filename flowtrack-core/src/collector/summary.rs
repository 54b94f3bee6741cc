//! Connection summary derivation (§4.6: "`get_summary` folds the filtered
//! flow list").

use std::collections::HashMap;
use std::net::IpAddr;

use flowtrack_contracts::{AttributedFlow, Protocol};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DestinationTotals {
    pub dest_ip: IpAddr,
    pub connection_count: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Folded view over a container's active flows. "Top destinations" is the
/// full grouped result (§4.6) — the caller decides ordering/truncation.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub container_name: Option<String>,
    pub active_connections: u64,
    pub tcp_connections: u64,
    pub udp_connections: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub destinations: Vec<DestinationTotals>,
}

pub fn summarize(container_name: Option<&str>, flows: &[AttributedFlow]) -> ConnectionSummary {
    let mut tcp = 0u64;
    let mut udp = 0u64;
    let mut bytes_sent = 0u64;
    let mut bytes_received = 0u64;
    let mut by_dest: HashMap<IpAddr, DestinationTotals> = HashMap::new();

    for flow in flows {
        match flow.raw.protocol {
            Protocol::Tcp => tcp += 1,
            Protocol::Udp => udp += 1,
            _ => {}
        }
        bytes_sent += flow.bytes_sent;
        bytes_received += flow.bytes_received;

        let entry = by_dest
            .entry(flow.raw.dst_ip)
            .or_insert_with(|| DestinationTotals {
                dest_ip: flow.raw.dst_ip,
                connection_count: 0,
                bytes_sent: 0,
                bytes_received: 0,
            });
        entry.connection_count += 1;
        entry.bytes_sent += flow.bytes_sent;
        entry.bytes_received += flow.bytes_received;
    }

    ConnectionSummary {
        container_name: container_name.map(str::to_string),
        active_connections: flows.len() as u64,
        tcp_connections: tcp,
        udp_connections: udp,
        bytes_sent,
        bytes_received,
        destinations: by_dest.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowtrack_contracts::{Direction, FlowEventKind, RawFlow};
    use std::net::Ipv4Addr;

    fn flow(protocol: Protocol, dst: &str, sent: u64, received: u64) -> AttributedFlow {
        let now = Utc::now();
        AttributedFlow {
            raw: RawFlow {
                id: "1".into(),
                kind: FlowEventKind::New,
                protocol,
                src_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
                src_port: 1,
                dst_ip: dst.parse().unwrap(),
                dst_port: 2,
                tcp_state: None,
                bytes_orig: sent,
                bytes_reply: received,
                packets_orig: 1,
                packets_reply: 1,
                timeout_seconds: 30,
                observed_at: now,
            },
            container_name: "a".into(),
            container_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
            direction: Direction::Egress,
            first_seen: now,
            last_seen: now,
            bytes_sent: sent,
            bytes_received: received,
            packets_sent: 1,
            packets_received: 1,
        }
    }

    #[test]
    fn folds_protocol_counts_and_totals() {
        let flows = vec![
            flow(Protocol::Tcp, "8.8.8.8", 100, 200),
            flow(Protocol::Udp, "8.8.8.8", 50, 10),
            flow(Protocol::Tcp, "1.1.1.1", 30, 5),
        ];

        let summary = summarize(Some("a"), &flows);
        assert_eq!(summary.active_connections, 3);
        assert_eq!(summary.tcp_connections, 2);
        assert_eq!(summary.udp_connections, 1);
        assert_eq!(summary.bytes_sent, 180);
        assert_eq!(summary.bytes_received, 215);
        assert_eq!(summary.destinations.len(), 2);

        let google = summary
            .destinations
            .iter()
            .find(|d| d.dest_ip == "8.8.8.8".parse::<IpAddr>().unwrap())
            .unwrap();
        assert_eq!(google.connection_count, 2);
        assert_eq!(google.bytes_sent, 150);
    }
}
