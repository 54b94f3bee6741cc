use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{AggregateBucket, Interval, PersistedFlow};

/// Default page size for [`FlowStore::query_history`] (§4.3).
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
/// Hard cap on [`HistoryQuery::limit`] (§4.3).
pub const MAX_HISTORY_LIMIT: u32 = 1_000;

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub container: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub dest_ip: Option<IpAddr>,
    pub dest_port: Option<u16>,
    pub offset: u32,
    pub limit: u32,
}

impl HistoryQuery {
    /// Clamps `limit` to `[1, MAX_HISTORY_LIMIT]`, defaulting an unset (zero)
    /// limit to [`DEFAULT_HISTORY_LIMIT`] (§4.3, §8 property 7).
    pub fn normalized(mut self) -> Self {
        self.limit = if self.limit == 0 {
            DEFAULT_HISTORY_LIMIT
        } else {
            self.limit.min(MAX_HISTORY_LIMIT)
        };
        self
    }
}

#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub container: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Interval,
    pub group_by_dest_ip: bool,
    pub group_by_dest_port: bool,
}

/// Append-only persistence for completed flows (§4.3, C4). Implementations
/// own a relational schema with two logical tables (completed flows and
/// optional pre-aggregates) as described in §4.3/§6.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Idempotent insert keyed by `flow_id`; ignores the call if a row with
    /// the same `flow_id` already exists (§3 invariant 4, §8 idempotence
    /// law). Implementations must not rely on in-memory deduplication (§9).
    async fn save_completed(&self, flow: &PersistedFlow) -> Result<()>;

    /// Upsert-add a pre-aggregate bucket: calling this twice with identical
    /// keys sums the counters rather than overwriting them (§8 idempotence
    /// law). Optional acceleration — the default implementation reports
    /// [`crate::ObserverError::Unavailable`] since `aggregate()` can always
    /// be served by computing on demand from completed flows.
    async fn save_aggregate(&self, _bucket: &AggregateBucket) -> Result<()> {
        Err(crate::error::ObserverError::Unavailable(
            "incremental pre-aggregate maintenance not supported by this store".into(),
        ))
    }

    /// Ordered (by `started_at` descending) page of completed flows plus
    /// the total matching count ignoring `limit`/`offset` (§4.3, §8
    /// property 7).
    async fn query_history(
        &self,
        query: HistoryQuery,
    ) -> Result<(Vec<PersistedFlow>, u64)>;

    /// Buckets ordered descending by bucket start (§4.3). Intervals smaller
    /// than the store's physical bucket width must error rather than
    /// silently widen (§9).
    async fn aggregate(&self, query: AggregateQuery) -> Result<Vec<AggregateBucket>>;

    /// Deletes rows whose insertion timestamp is strictly older than
    /// `now − retention_days` (§4.3, §8 property 6). Returns the number of
    /// rows removed.
    async fn cleanup(&self, retention_days: u32) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: u32) -> HistoryQuery {
        HistoryQuery {
            container: "web".into(),
            start: Utc::now(),
            end: Utc::now(),
            dest_ip: None,
            dest_port: None,
            offset: 0,
            limit,
        }
    }

    #[test]
    fn normalized_defaults_a_zero_limit() {
        assert_eq!(query(0).normalized().limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn normalized_caps_an_oversized_limit() {
        assert_eq!(
            query(MAX_HISTORY_LIMIT + 500).normalized().limit,
            MAX_HISTORY_LIMIT
        );
    }

    #[test]
    fn normalized_leaves_an_in_range_limit_untouched() {
        assert_eq!(query(10).normalized().limit, 10);
    }
}
