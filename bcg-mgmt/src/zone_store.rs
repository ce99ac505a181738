//! The slice of the replicated store zone orchestration needs

use async_trait::async_trait;
use bcg_store::{DistributedStore, SpeakerConfig, ZoneConfig};

use crate::error::Result;

/// Persistent speaker and zone configuration.
///
/// Reads may be stale on followers. Writes fail with `NotLeader` anywhere
/// but on the consensus leader.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    fn am_leader(&self) -> bool;

    /// Consensus address of the current leader
    fn leader(&self) -> Option<String>;

    fn speaker_config(&self, id: &str) -> Option<SpeakerConfig>;

    fn zone_configs(&self) -> Vec<ZoneConfig>;

    async fn save_speaker_config(&self, config: SpeakerConfig) -> Result<()>;

    async fn save_zone_config(&self, config: ZoneConfig) -> Result<()>;

    async fn delete_zone_config(&self, id: &str) -> Result<()>;

    /// Add a management node to the consensus group; ignored unless leader
    async fn join(&self, name: &str, addr: &str) -> Result<()>;
}

#[async_trait]
impl ZoneStore for DistributedStore {
    fn am_leader(&self) -> bool {
        DistributedStore::am_leader(self)
    }

    fn leader(&self) -> Option<String> {
        DistributedStore::leader(self)
    }

    fn speaker_config(&self, id: &str) -> Option<SpeakerConfig> {
        DistributedStore::speaker_config(self, id)
    }

    fn zone_configs(&self) -> Vec<ZoneConfig> {
        DistributedStore::zone_configs(self)
    }

    async fn save_speaker_config(&self, config: SpeakerConfig) -> Result<()> {
        Ok(DistributedStore::save_speaker_config(self, config).await?)
    }

    async fn save_zone_config(&self, config: ZoneConfig) -> Result<()> {
        Ok(DistributedStore::save_zone_config(self, config).await?)
    }

    async fn delete_zone_config(&self, id: &str) -> Result<()> {
        Ok(DistributedStore::delete_zone_config(self, id).await?)
    }

    async fn join(&self, name: &str, addr: &str) -> Result<()> {
        Ok(DistributedStore::join(self, name, addr).await?)
    }
}
