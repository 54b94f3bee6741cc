use async_trait::async_trait;

use crate::error::Result;
use crate::model::DirectoryEntry;

/// Container inventory source (§4, C1): enumerates `{container name → IP}`
/// snapshots. Implementations talk to whatever owns container naming on the
/// host (a container runtime's API, an orchestrator's registry, ...); only
/// the contract is specified here (§1).
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    async fn list(&self) -> Result<Vec<DirectoryEntry>>;
}
