//! `flowtrack-collectord`: wires C1, C2, C4, C7, C8 and runs the Collector
//! until a shutdown signal arrives. No HTTP/RPC surface — the RPC layer
//! described alongside this component is a separate collaborator.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flowtrack_config::{CliOverrides, ConfigLoader};
#[cfg(feature = "postgres")]
use flowtrack_core::store::PostgresFlowStore;
use flowtrack_core::testing::{NullFlowSource, StaticInventoryProvider};
use flowtrack_core::{Collector, CollectorConfig, DirectoryCache, InMemoryEventFanout};
use flowtrack_contracts::{EventFanout, FlowSource, FlowStore};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Collector daemon command-line interface.
#[derive(Parser, Debug)]
#[command(name = "flowtrack-collectord")]
#[command(about = "Per-host container network traffic observer collector daemon")]
struct Args {
    /// Path to a TOML config file (overrides the default search locations).
    #[arg(long, env = "FLOWTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// CIDR for the container network (overrides config).
    #[arg(long, env = "FLOWTRACK_NETWORK_CIDR")]
    network_cidr: Option<String>,

    /// Postgres connection string for completed-flow persistence.
    #[arg(long, env = "FLOWTRACK_STORE_CONNECTION_STRING")]
    store_connection_string: Option<String>,

    /// Retention window for completed flows, in days.
    #[arg(long, env = "FLOWTRACK_RETENTION_DAYS")]
    retention_days: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowtrack_collectord=info,flowtrack_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let load = loader.load_with_overrides(CliOverrides {
        network_cidr: args.network_cidr,
        store_connection_string: args.store_connection_string,
        retention_days: args.retention_days,
        ..Default::default()
    })?;
    let settings = load.settings;
    info!(config_path = ?load.config_path, "configuration loaded");

    let inventory = Arc::new(StaticInventoryProvider::default());
    let directory = Arc::new(DirectoryCache::new(
        inventory,
        settings.network_cidr.as_deref(),
        settings.directory_refresh_interval,
    ));
    info!(
        network = directory.configured_network().as_deref().unwrap_or("none"),
        "configured network"
    );

    let source: Option<Arc<dyn FlowSource>> = Some(Arc::new(NullFlowSource));

    // §6/§7: an absent connection string disables persistence outright —
    // query endpoints then fail with `UNAVAILABLE` rather than silently
    // falling back to transient storage.
    let store: Option<Arc<dyn FlowStore>> = match settings.store_connection_string.as_deref() {
        #[cfg(feature = "postgres")]
        Some(connection_string) => match PostgresFlowStore::connect(connection_string).await {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                warn!(error = %err, "failed to connect to Postgres store; running without persistence");
                None
            }
        },
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!("store_connection_string set but the postgres feature is disabled; running without persistence");
            None
        }
        None => {
            warn!("no store_connection_string configured; persistence disabled");
            None
        }
    };

    let fanout: Option<Arc<dyn EventFanout>> = Some(Arc::new(InMemoryEventFanout::new()));

    let config = CollectorConfig {
        network_cidr: settings.network_cidr,
        snapshot_interval: settings.snapshot_interval,
        cleanup_interval: settings.cleanup_interval,
        retention_days: settings.retention_days,
        directory_refresh_interval: settings.directory_refresh_interval,
        event_channel_capacity: settings.event_channel_capacity,
        ..Default::default()
    };

    let collector = Arc::new(Collector::new(config, directory, source, store, fanout));
    collector.start().await?;
    info!(available = collector.is_available(), "collector started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    collector.stop().await?;
    info!("collector stopped cleanly");

    Ok(())
}
