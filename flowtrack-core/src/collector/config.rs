//! Collector configuration (§4.6 inputs, §6).

use std::time::Duration;

/// Matches §6's recognized configuration surface, plus the ambient tunables
/// promoted to fields in `SPEC_FULL.md` (`event_channel_capacity`,
/// `directory_refresh_interval`) that the upstream distillation left as
/// prose defaults.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// CIDR defining the container network, passed through to the
    /// [`crate::directory::DirectoryCache`] (§4.1, §6).
    pub network_cidr: Option<String>,
    pub snapshot_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: u32,
    pub directory_refresh_interval: Duration,
    /// Bound on `C3.events()`'s channel and on the persist-task queue feeding
    /// the persist worker pool (§4.2, §5).
    pub event_channel_capacity: usize,
    /// Size of the persist worker pool (§5: "small constant, e.g., 4").
    pub persist_workers: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            network_cidr: None,
            snapshot_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 7,
            directory_refresh_interval: crate::directory::DEFAULT_REFRESH_INTERVAL,
            event_channel_capacity: 1024,
            persist_workers: 4,
        }
    }
}
