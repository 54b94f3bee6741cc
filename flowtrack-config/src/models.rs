use std::time::Duration;

/// Effective configuration for the Collector (§6): exactly the keys named
/// there, plus the ambient tunables `SPEC_FULL.md` promotes to config
/// fields (`event_channel_capacity`, `directory_refresh_interval`).
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub network_cidr: Option<String>,
    pub snapshot_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: u32,
    pub store_connection_string: Option<String>,
    pub event_channel_capacity: usize,
    pub directory_refresh_interval: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            network_cidr: None,
            snapshot_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 7,
            store_connection_string: None,
            event_channel_capacity: 1024,
            directory_refresh_interval: Duration::from_secs(30),
        }
    }
}

/// TOML-deserializable overlay; every field optional so a partial file only
/// overrides the keys it names.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileConfig {
    pub network_cidr: Option<String>,
    pub snapshot_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_days: Option<u32>,
    pub store_connection_string: Option<String>,
    pub event_channel_capacity: Option<usize>,
    pub directory_refresh_interval_secs: Option<u64>,
}

/// Raw `FLOWTRACK_*` environment variables, gathered once and held as
/// strings/options so [`crate::loader::ConfigLoader`] can apply parsing and
/// precedence uniformly.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<String>,
    pub network_cidr: Option<String>,
    pub snapshot_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_days: Option<u32>,
    pub store_connection_string: Option<String>,
    pub event_channel_capacity: Option<usize>,
    pub directory_refresh_interval_secs: Option<u64>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: read_string("FLOWTRACK_CONFIG"),
            network_cidr: read_string("FLOWTRACK_NETWORK_CIDR"),
            snapshot_interval_secs: read_parsed("FLOWTRACK_SNAPSHOT_INTERVAL_SECS"),
            cleanup_interval_secs: read_parsed("FLOWTRACK_CLEANUP_INTERVAL_SECS"),
            retention_days: read_parsed("FLOWTRACK_RETENTION_DAYS"),
            store_connection_string: read_string("FLOWTRACK_STORE_CONNECTION_STRING"),
            event_channel_capacity: read_parsed("FLOWTRACK_EVENT_CHANNEL_CAPACITY"),
            directory_refresh_interval_secs: read_parsed(
                "FLOWTRACK_DIRECTORY_REFRESH_INTERVAL_SECS",
            ),
        }
    }
}

fn read_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    read_string(key).and_then(|v| v.parse().ok())
}

/// CLI-supplied overrides (highest precedence, §6). All optional — absent
/// fields fall through to file/env/defaults.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub network_cidr: Option<String>,
    pub snapshot_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_days: Option<u32>,
    pub store_connection_string: Option<String>,
    pub event_channel_capacity: Option<usize>,
    pub directory_refresh_interval_secs: Option<u64>,
}
