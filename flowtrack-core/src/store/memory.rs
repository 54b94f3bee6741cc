//! In-memory [`FlowStore`] reference implementation, used for tests and for
//! running the Collector without a configured `store_connection_string`
//! during development (§6: absent ⇒ persistence disabled in production, but
//! nothing stops a caller from wiring this in for a demo/dry run).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtrack_contracts::{
    AggregateBucket, AggregateQuery, FlowStore, HistoryQuery, ObserverError, PersistedFlow, Result,
};
use parking_lot::Mutex;

#[derive(Debug)]
struct Row {
    flow: PersistedFlow,
    inserted_at: DateTime<Utc>,
}

/// Append-only, idempotent-by-`flow_id` store backed by a `Mutex<HashMap>`.
/// Matches the shape of `ferrex-core`'s repository traits but with no
/// backing database — fine for a single-process observer used in tests.
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    rows: Mutex<HashMap<String, Row>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save_completed(&self, flow: &PersistedFlow) -> Result<()> {
        let mut rows = self.rows.lock();
        rows.entry(flow.flow_id.clone()).or_insert_with(|| Row {
            flow: flow.clone(),
            inserted_at: Utc::now(),
        });
        Ok(())
    }

    async fn query_history(&self, query: HistoryQuery) -> Result<(Vec<PersistedFlow>, u64)> {
        if query.container.trim().is_empty() {
            return Err(ObserverError::InvalidArgument(
                "container is required".into(),
            ));
        }
        let query = query.normalized();

        let rows = self.rows.lock();
        let mut matching: Vec<&PersistedFlow> = rows
            .values()
            .map(|row| &row.flow)
            .filter(|flow| {
                flow.container_name == query.container
                    && flow.started_at >= query.start
                    && flow.started_at <= query.end
                    && query.dest_ip.is_none_or(|ip| flow.dst_ip == ip)
                    && query.dest_port.is_none_or(|port| flow.dst_port == port)
            })
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn aggregate(&self, query: AggregateQuery) -> Result<Vec<AggregateBucket>> {
        if query.container.trim().is_empty() {
            return Err(ObserverError::InvalidArgument(
                "container is required".into(),
            ));
        }

        let rows = self.rows.lock();
        let bucket_width = query.interval.as_chrono();

        let mut buckets: HashMap<(DateTime<Utc>, Option<_>, Option<_>), AggregateBucket> =
            HashMap::new();
        for row in rows.values() {
            let flow = &row.flow;
            if flow.container_name != query.container
                || flow.started_at < query.start
                || flow.started_at > query.end
            {
                continue;
            }

            let interval_start = truncate_to_interval(flow.started_at, bucket_width);
            let dest_ip = query.group_by_dest_ip.then_some(flow.dst_ip);
            let dest_port = query.group_by_dest_port.then_some(flow.dst_port);
            let key = (interval_start, dest_ip, dest_port);

            let bucket = buckets.entry(key).or_insert_with(|| AggregateBucket {
                container_name: query.container.clone(),
                dest_ip,
                dest_port,
                interval_start,
                interval: query.interval,
                bytes_sent: 0,
                bytes_received: 0,
                connection_count: 0,
            });
            bucket.bytes_sent += flow.bytes_sent;
            bucket.bytes_received += flow.bytes_received;
            bucket.connection_count += 1;
        }

        let mut out: Vec<AggregateBucket> = buckets.into_values().collect();
        out.sort_by(|a, b| b.interval_start.cmp(&a.interval_start));
        Ok(out)
    }

    async fn cleanup(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, row| row.inserted_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

fn truncate_to_interval(
    at: DateTime<Utc>,
    width: chrono::Duration,
) -> DateTime<Utc> {
    let width_secs = width.num_seconds().max(1);
    let epoch_secs = at.timestamp();
    let truncated = epoch_secs - epoch_secs.rem_euclid(width_secs);
    DateTime::from_timestamp(truncated, 0).unwrap_or(at)
}
