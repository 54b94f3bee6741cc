use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layer-4 protocol carried by a flow (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

/// The event kind a [`RawFlow`] carries (§3: `type ∈ {NEW, UPDATE, DESTROY}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowEventKind {
    New,
    Update,
    Destroy,
}

/// TCP connection state as reported by conntrack.
///
/// Open question (§9): the upstream source folds `LAST_ACK` and `TIME_WAIT`
/// into the same canonical state. This implementation keeps them distinct —
/// see `DESIGN.md` for the rationale — without breaking any invariant in §3
/// or §8, since nothing here branches on the collapsed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcpState {
    SynSent,
    SynRecv,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
    Close,
    Listen,
    Closing,
}

/// A raw Layer-4 flow observed from the kernel conntrack feed (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFlow {
    /// Stable, source-provided identifier. Correlates events for the same
    /// flow across NEW/UPDATE/DESTROY.
    pub id: String,
    pub kind: FlowEventKind,
    pub protocol: Protocol,
    pub src_ip: IpAddr,
    /// `0` for ICMP, per §3.
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    /// Present only when `protocol == Protocol::Tcp`.
    pub tcp_state: Option<TcpState>,
    /// Cumulative, monotonic nondecreasing per `id` while the flow is active.
    pub bytes_orig: u64,
    pub bytes_reply: u64,
    pub packets_orig: u64,
    pub packets_reply: u64,
    pub timeout_seconds: u32,
    pub observed_at: DateTime<Utc>,
}

/// Which side of an [`AttributedFlow`] the container occupies (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Egress,
    Ingress,
}

/// A [`RawFlow`] that has been joined against the directory cache (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributedFlow {
    pub raw: RawFlow,
    pub container_name: String,
    pub container_ip: IpAddr,
    pub direction: Direction,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Logical counters computed from `raw`'s orig/reply counters by
    /// direction (§4.4): EGRESS maps sent←orig, received←reply; INGRESS
    /// inverts the mapping.
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

impl AttributedFlow {
    pub fn flow_id(&self) -> &str {
        &self.raw.id
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.raw.kind, FlowEventKind::Destroy)
    }
}

/// `{name, ip}` entry produced by an [`crate::InventoryProvider`] snapshot
/// (§3). Invariants (enforced by [`crate::DirectoryCache::refresh`], not by
/// this type): name unique, ip unique within a refresh generation, entries
/// with an unset ip excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub ip: IpAddr,
}

/// A completed flow as stored by a [`crate::FlowStore`] (§3, C4 row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFlow {
    pub flow_id: String,
    pub container_name: String,
    pub container_ip: IpAddr,
    pub direction: Direction,
    pub protocol: Protocol,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl PersistedFlow {
    /// Build the durable row for a flow observed through its DESTROY event
    /// (§8 scenario 3): `started_at` is the flow's first observation,
    /// `ended_at` is the DESTROY's `observed_at`, and `duration_seconds` is
    /// the difference rounded to whole seconds.
    pub fn from_attributed(flow: &AttributedFlow) -> Self {
        let started_at = flow.first_seen;
        let ended_at = flow.last_seen;
        let duration_seconds = (ended_at - started_at).num_seconds();
        Self {
            flow_id: flow.flow_id().to_string(),
            container_name: flow.container_name.clone(),
            container_ip: flow.container_ip,
            direction: flow.direction,
            protocol: flow.raw.protocol,
            src_ip: flow.raw.src_ip,
            src_port: flow.raw.src_port,
            dst_ip: flow.raw.dst_ip,
            dst_port: flow.raw.dst_port,
            bytes_sent: flow.bytes_sent,
            bytes_received: flow.bytes_received,
            packets_sent: flow.packets_sent,
            packets_received: flow.packets_received,
            started_at,
            ended_at: Some(ended_at),
            duration_seconds: Some(duration_seconds),
        }
    }
}

/// Supported aggregation bucket widths (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwelveHours,
    OneDay,
}

impl Interval {
    pub fn as_chrono(&self) -> chrono::Duration {
        use chrono::Duration;
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::FiveMinutes => Duration::minutes(5),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::ThirtyMinutes => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
            Interval::SixHours => Duration::hours(6),
            Interval::TwelveHours => Duration::hours(12),
            Interval::OneDay => Duration::days(1),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "1m" => Some(Interval::OneMinute),
            "5m" => Some(Interval::FiveMinutes),
            "15m" => Some(Interval::FifteenMinutes),
            "30m" => Some(Interval::ThirtyMinutes),
            "1h" => Some(Interval::OneHour),
            "6h" => Some(Interval::SixHours),
            "12h" => Some(Interval::TwelveHours),
            "1d" => Some(Interval::OneDay),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn raw(kind: FlowEventKind) -> RawFlow {
        RawFlow {
            id: "flow-1".into(),
            kind,
            protocol: Protocol::Tcp,
            src_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
            src_port: 40000,
            dst_ip: Ipv4Addr::new(93, 184, 216, 34).into(),
            dst_port: 443,
            tcp_state: None,
            bytes_orig: 1500,
            bytes_reply: 9000,
            packets_orig: 3,
            packets_reply: 7,
            timeout_seconds: 120,
            observed_at: Utc::now(),
        }
    }

    fn attributed(kind: FlowEventKind, first_seen: DateTime<Utc>, last_seen: DateTime<Utc>) -> AttributedFlow {
        AttributedFlow {
            raw: raw(kind),
            container_name: "web".into(),
            container_ip: Ipv4Addr::new(10, 0, 0, 5).into(),
            direction: Direction::Egress,
            first_seen,
            last_seen,
            bytes_sent: 1500,
            bytes_received: 9000,
            packets_sent: 3,
            packets_received: 7,
        }
    }

    #[test]
    fn is_active_is_false_only_for_destroy() {
        let now = Utc::now();
        assert!(attributed(FlowEventKind::New, now, now).is_active());
        assert!(attributed(FlowEventKind::Update, now, now).is_active());
        assert!(!attributed(FlowEventKind::Destroy, now, now).is_active());
    }

    #[test]
    fn from_attributed_computes_duration_from_first_and_last_seen() {
        let first_seen = Utc::now();
        let last_seen = first_seen + chrono::Duration::seconds(42);
        let flow = attributed(FlowEventKind::Destroy, first_seen, last_seen);

        let persisted = PersistedFlow::from_attributed(&flow);

        assert_eq!(persisted.flow_id, "flow-1");
        assert_eq!(persisted.started_at, first_seen);
        assert_eq!(persisted.ended_at, Some(last_seen));
        assert_eq!(persisted.duration_seconds, Some(42));
        assert_eq!(persisted.bytes_sent, 1500);
        assert_eq!(persisted.bytes_received, 9000);
    }

    #[test]
    fn interval_parse_round_trips_every_variant() {
        let variants = [
            ("1m", Interval::OneMinute),
            ("5m", Interval::FiveMinutes),
            ("15m", Interval::FifteenMinutes),
            ("30m", Interval::ThirtyMinutes),
            ("1h", Interval::OneHour),
            ("6h", Interval::SixHours),
            ("12h", Interval::TwelveHours),
            ("1d", Interval::OneDay),
        ];
        for (raw, expected) in variants {
            assert_eq!(Interval::parse(raw), Some(expected));
        }
        assert_eq!(Interval::parse("2w"), None);
    }

    #[test]
    fn interval_as_chrono_orders_shortest_to_longest() {
        let widths = [
            Interval::OneMinute,
            Interval::FiveMinutes,
            Interval::FifteenMinutes,
            Interval::ThirtyMinutes,
            Interval::OneHour,
            Interval::SixHours,
            Interval::TwelveHours,
            Interval::OneDay,
        ]
        .map(|interval| interval.as_chrono());
        assert!(widths.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

/// A `(container_name, dest_ip?, dest_port?, interval_start)` aggregate row
/// (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub container_name: String,
    pub dest_ip: Option<IpAddr>,
    pub dest_port: Option<u16>,
    pub interval_start: DateTime<Utc>,
    pub interval: Interval,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_count: u64,
}
