//! Postgres-backed [`FlowStore`] (C4, §4.3).
//!
//! Grounded on `ferrex-core::database::postgres` for pool construction and
//! on `ferrex-core::database::infrastructure::postgres::repositories::watch_status`
//! for the upsert/query shape. This uses `sqlx::query` with manual `FromRow`
//! mapping rather than the `sqlx::query!` macro family — the macro checks
//! queries at compile time against a live database or a committed `.sqlx`
//! offline cache, neither of which this workspace carries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtrack_contracts::{
    AggregateBucket, AggregateQuery, Direction, FlowStore, HistoryQuery, ObserverError,
    PersistedFlow, Protocol, Result,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::info;

/// Embeds the SQL migration files committed under `migrations/` so
/// [`PostgresFlowStore::connect`] can run them with `sqlx::migrate!`,
/// matching `ferrex-core`'s versioned-migration posture for its Postgres
/// repositories.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PostgresFlowStore {
    pool: PgPool,
}

impl PostgresFlowStore {
    /// Opens a pool and applies pending migrations. Pool sizing mirrors
    /// `PostgresDatabase::new`'s conservative acquire/idle/lifetime
    /// defaults, scaled down for a single-purpose observer store.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await
            .map_err(|err| ObserverError::IoFailure(format!("postgres connect failed: {err}")))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|err| ObserverError::IoFailure(format!("migration failed: {err}")))?;

        info!("flow store connected and migrated");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Egress => "egress",
        Direction::Ingress => "ingress",
    }
}

fn parse_direction(raw: &str) -> Result<Direction> {
    match raw {
        "egress" => Ok(Direction::Egress),
        "ingress" => Ok(Direction::Ingress),
        other => Err(ObserverError::IoFailure(format!(
            "unrecognized direction column value: {other}"
        ))),
    }
}

fn protocol_str(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Icmp => "icmp",
        Protocol::Other => "other",
    }
}

fn parse_protocol(raw: &str) -> Result<Protocol> {
    match raw {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        "icmp" => Ok(Protocol::Icmp),
        "other" => Ok(Protocol::Other),
        other => Err(ObserverError::IoFailure(format!(
            "unrecognized protocol column value: {other}"
        ))),
    }
}

impl FromRow<'_, PgRow> for PersistedFlow {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let direction: String = row.try_get("direction")?;
        let protocol: String = row.try_get("protocol")?;
        Ok(PersistedFlow {
            flow_id: row.try_get("flow_id")?,
            container_name: row.try_get("container_name")?,
            container_ip: row.try_get("container_ip")?,
            direction: parse_direction(&direction)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            protocol: parse_protocol(&protocol).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            src_ip: row.try_get("src_ip")?,
            src_port: row.try_get::<i32, _>("src_port")? as u16,
            dst_ip: row.try_get("dst_ip")?,
            dst_port: row.try_get::<i32, _>("dst_port")? as u16,
            bytes_sent: row.try_get::<i64, _>("bytes_sent")? as u64,
            bytes_received: row.try_get::<i64, _>("bytes_received")? as u64,
            packets_sent: row.try_get::<i64, _>("packets_sent")? as u64,
            packets_received: row.try_get::<i64, _>("packets_received")? as u64,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
        })
    }
}

#[async_trait]
impl FlowStore for PostgresFlowStore {
    async fn save_completed(&self, flow: &PersistedFlow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO completed_flows (
                flow_id, container_name, container_ip, direction, protocol,
                src_ip, src_port, dst_ip, dst_port,
                bytes_sent, bytes_received, packets_sent, packets_received,
                started_at, ended_at, duration_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (flow_id) DO NOTHING
            "#,
        )
        .bind(&flow.flow_id)
        .bind(&flow.container_name)
        .bind(flow.container_ip)
        .bind(direction_str(flow.direction))
        .bind(protocol_str(flow.protocol))
        .bind(flow.src_ip)
        .bind(flow.src_port as i32)
        .bind(flow.dst_ip)
        .bind(flow.dst_port as i32)
        .bind(flow.bytes_sent as i64)
        .bind(flow.bytes_received as i64)
        .bind(flow.packets_sent as i64)
        .bind(flow.packets_received as i64)
        .bind(flow.started_at)
        .bind(flow.ended_at)
        .bind(flow.duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(|err| ObserverError::IoFailure(format!("save_completed failed: {err}")))?;

        Ok(())
    }

    async fn query_history(&self, query: HistoryQuery) -> Result<(Vec<PersistedFlow>, u64)> {
        if query.container.trim().is_empty() {
            return Err(ObserverError::InvalidArgument(
                "container is required".into(),
            ));
        }
        let query = query.normalized();

        let total: i64 = sqlx::query(
            r#"
            SELECT count(*) AS count
            FROM completed_flows
            WHERE container_name = $1
              AND started_at BETWEEN $2 AND $3
              AND ($4::inet IS NULL OR dst_ip = $4)
              AND ($5::int IS NULL OR dst_port = $5)
            "#,
        )
        .bind(&query.container)
        .bind(query.start)
        .bind(query.end)
        .bind(query.dest_ip)
        .bind(query.dest_port.map(i32::from))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| ObserverError::IoFailure(format!("history count failed: {err}")))?
        .try_get("count")
        .map_err(|err| ObserverError::IoFailure(format!("history count decode failed: {err}")))?;

        let rows = sqlx::query_as::<_, PersistedFlow>(
            r#"
            SELECT flow_id, container_name, container_ip, direction, protocol,
                   src_ip, src_port, dst_ip, dst_port,
                   bytes_sent, bytes_received, packets_sent, packets_received,
                   started_at, ended_at, duration_seconds
            FROM completed_flows
            WHERE container_name = $1
              AND started_at BETWEEN $2 AND $3
              AND ($4::inet IS NULL OR dst_ip = $4)
              AND ($5::int IS NULL OR dst_port = $5)
            ORDER BY started_at DESC
            OFFSET $6
            LIMIT $7
            "#,
        )
        .bind(&query.container)
        .bind(query.start)
        .bind(query.end)
        .bind(query.dest_ip)
        .bind(query.dest_port.map(i32::from))
        .bind(query.offset as i64)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ObserverError::IoFailure(format!("history query failed: {err}")))?;

        Ok((rows, total as u64))
    }

    async fn aggregate(&self, query: AggregateQuery) -> Result<Vec<AggregateBucket>> {
        if query.container.trim().is_empty() {
            return Err(ObserverError::InvalidArgument(
                "container is required".into(),
            ));
        }

        let bucket_seconds = query.interval.as_chrono().num_seconds();

        let rows = sqlx::query(
            r#"
            SELECT
                to_timestamp(floor(extract(epoch FROM started_at) / $1) * $1) AS bucket,
                CASE WHEN $2 THEN dst_ip ELSE NULL END AS dest_ip,
                CASE WHEN $3 THEN dst_port ELSE NULL END AS dest_port,
                sum(bytes_sent) AS bytes_sent,
                sum(bytes_received) AS bytes_received,
                count(*) AS connection_count
            FROM completed_flows
            WHERE container_name = $4
              AND started_at BETWEEN $5 AND $6
            GROUP BY bucket, dest_ip, dest_port
            ORDER BY bucket DESC
            "#,
        )
        .bind(bucket_seconds as f64)
        .bind(query.group_by_dest_ip)
        .bind(query.group_by_dest_port)
        .bind(&query.container)
        .bind(query.start)
        .bind(query.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ObserverError::IoFailure(format!("aggregate query failed: {err}")))?;

        let mut buckets = Vec::with_capacity(rows.len());
        for row in rows {
            let interval_start: DateTime<Utc> = row
                .try_get("bucket")
                .map_err(|err| ObserverError::IoFailure(format!("bucket decode failed: {err}")))?;
            let dest_port: Option<i32> = row
                .try_get("dest_port")
                .map_err(|err| ObserverError::IoFailure(format!("dest_port decode failed: {err}")))?;
            buckets.push(AggregateBucket {
                container_name: query.container.clone(),
                dest_ip: row.try_get("dest_ip").map_err(|err| {
                    ObserverError::IoFailure(format!("dest_ip decode failed: {err}"))
                })?,
                dest_port: dest_port.map(|p| p as u16),
                interval_start,
                interval: query.interval,
                bytes_sent: row
                    .try_get::<i64, _>("bytes_sent")
                    .map_err(|err| ObserverError::IoFailure(format!("bytes_sent decode failed: {err}")))?
                    as u64,
                bytes_received: row
                    .try_get::<i64, _>("bytes_received")
                    .map_err(|err| {
                        ObserverError::IoFailure(format!("bytes_received decode failed: {err}"))
                    })? as u64,
                connection_count: row
                    .try_get::<i64, _>("connection_count")
                    .map_err(|err| {
                        ObserverError::IoFailure(format!("connection_count decode failed: {err}"))
                    })? as u64,
            });
        }

        Ok(buckets)
    }

    async fn cleanup(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let result = sqlx::query("DELETE FROM completed_flows WHERE inserted_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|err| ObserverError::IoFailure(format!("cleanup failed: {err}")))?;

        Ok(result.rows_affected())
    }
}
