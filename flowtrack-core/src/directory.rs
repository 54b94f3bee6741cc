//! Directory Cache (C2, §4.1): a thread-safe bidirectional IP↔name map
//! refreshed on a fixed cadence from an [`InventoryProvider`].
//!
//! Modeled on the bidirectional-map-rebuilt-under-one-lock pattern used by
//! `ferrex-server`'s request-scoped caches (`infra/cache/movie_batches_cache.rs`):
//! build the replacement state aside, then swap it in under a single write
//! lock so readers never observe a half-rebuilt map.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowtrack_contracts::{DirectoryEntry, InventoryProvider, ObserverError, Result};
use ipnetwork::IpNetwork;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct DirectoryState {
    by_name: HashMap<String, IpAddr>,
    by_ip: HashMap<IpAddr, String>,
}

#[derive(Debug)]
pub struct DirectoryCache {
    inventory: Arc<dyn InventoryProvider>,
    network: Option<IpNetwork>,
    refresh_interval: Duration,
    state: RwLock<DirectoryState>,
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
    last_refresh_error: RwLock<Option<String>>,
}

impl DirectoryCache {
    /// Parses `network_cidr` once at construction. A parse failure warns and
    /// leaves [`DirectoryCache::is_in_network`] returning `false` for every
    /// input rather than failing construction (§4.1, §7).
    pub fn new(
        inventory: Arc<dyn InventoryProvider>,
        network_cidr: Option<&str>,
        refresh_interval: Duration,
    ) -> Self {
        let network = network_cidr.and_then(|raw| match raw.parse::<IpNetwork>() {
            Ok(net) => Some(net),
            Err(err) => {
                warn!(cidr = raw, error = %err, "failed to parse network_cidr; membership checks will return false");
                None
            }
        });

        Self {
            inventory,
            network,
            refresh_interval,
            state: RwLock::new(DirectoryState::default()),
            last_refresh_at: RwLock::new(None),
            last_refresh_error: RwLock::new(None),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Fetches a full inventory list and rebuilds both maps atomically. A
    /// failure logs and leaves the previous generation intact (§4.1) — a
    /// failed *initial* refresh does not prevent construction; the cache
    /// simply starts (and stays) empty until the first successful refresh.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let entries = match self.inventory.list().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "directory refresh failed; keeping previous generation");
                *self.last_refresh_error.write() = Some(err.to_string());
                return Ok(());
            }
        };

        let mut next = DirectoryState::default();
        for entry in entries {
            if matches!(entry.ip, IpAddr::V4(v4) if v4.is_unspecified())
                || matches!(entry.ip, IpAddr::V6(v6) if v6.is_unspecified())
            {
                continue;
            }
            next.by_name.insert(entry.name.clone(), entry.ip);
            next.by_ip.insert(entry.ip, entry.name);
        }

        let count = next.by_name.len();
        {
            let mut state = self.state.write();
            *state = next;
        }
        *self.last_refresh_at.write() = Some(Utc::now());
        *self.last_refresh_error.write() = None;
        debug!(entries = count, "directory refreshed");
        Ok(())
    }

    /// Triggers a synchronous refresh if the cache currently has no
    /// entries — used by read paths that must not serve a cold cache
    /// (§4.1, §4.6).
    pub async fn refresh_if_empty(&self) -> Result<()> {
        if self.size() == 0 {
            self.refresh().await?;
        }
        Ok(())
    }

    pub fn lookup_by_ip(&self, ip: IpAddr) -> Option<String> {
        self.state.read().by_ip.get(&ip).cloned()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<IpAddr> {
        self.state.read().by_name.get(name).copied()
    }

    /// Returns `false` unconditionally if no CIDR was configured or it
    /// failed to parse (§4.1).
    pub fn is_in_network(&self, ip: IpAddr) -> bool {
        match &self.network {
            Some(network) => network.contains(ip),
            None => false,
        }
    }

    /// Defensive copy of the current generation (§4.1).
    pub fn snapshot(&self) -> HashMap<String, IpAddr> {
        self.state.read().by_name.clone()
    }

    pub fn size(&self) -> usize {
        self.state.read().by_name.len()
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh_at.read()
    }

    pub fn last_refresh_error(&self) -> Option<String> {
        self.last_refresh_error.read().clone()
    }

    pub fn configured_network(&self) -> Option<String> {
        self.network.as_ref().map(|n| n.to_string())
    }
}
