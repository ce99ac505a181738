//! Zone repair driven by music nodes joining and leaving
//!
//! Both handlers only act on the consensus leader and run detached from any
//! caller, so failures are logged rather than returned.

use bcg_cluster::{Member, NodeRole};
use bcg_store::ZoneConfig;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::service::ZoneService;

impl ZoneService {
    /// Bring a returning music node back into the zone it belonged to
    pub async fn handle_music_node_join(&self, node: &Member) {
        if !self.store.am_leader() {
            return;
        }
        info!(node = %node.name, "music node joined, checking zone membership");

        let mut found: Option<(ZoneConfig, bool)> = None;
        for zone in self.store.zone_configs() {
            if zone.leader_id == node.name {
                info!(node = %node.name, zone = %zone.display_name, "node was leading zone");
                found = Some((zone, true));
                break;
            }
            if found.is_none() && zone.speakers.contains(&node.name) {
                info!(node = %node.name, zone = %zone.display_name, "node was member of zone");
                found = Some((zone, false));
            }
        }

        let Some((zone, was_leader)) = found else {
            debug!(node = %node.name, "node is not part of any zone");
            return;
        };

        // stale links must not keep forwarding to the returning node
        if let Err(e) = self.remove_from_all_speakers(&[node.name.clone()]).await {
            warn!(node = %node.name, "failed to clear stale forward targets: {}", e);
        }

        let result = if was_leader {
            self.restore_zone_leader(node, &zone).await
        } else {
            self.restore_zone_member(node, &zone).await
        };
        if let Err(e) = result {
            warn!(node = %node.name, zone = %zone.id, "failed to restore node into zone: {}", e);
        }
    }

    /// Promote a new zone leader when the current one leaves
    pub async fn handle_music_node_leave(&self, node: &Member) {
        if !self.store.am_leader() {
            return;
        }
        info!(node = %node.name, "music node left, checking zone leadership");

        let Some(zone) = self
            .store
            .zone_configs()
            .into_iter()
            .find(|zone| zone.leader_id == node.name)
        else {
            return;
        };
        info!(node = %node.name, zone = %zone.display_name, "zone lost its leader");

        let live = self.live_speaker_names();
        let Some(promoted) = zone
            .speakers
            .iter()
            .find(|id| **id != node.name && live.contains(id))
            .cloned()
        else {
            warn!(zone = %zone.display_name, "no live member to promote, zone stays leaderless");
            return;
        };

        if let Err(e) = self.promote_zone_leader(&node.name, &promoted, zone).await {
            warn!(node = %promoted, "failed to promote new zone leader: {}", e);
        }
    }

    async fn restore_zone_leader(&self, node: &Member, zone: &ZoneConfig) -> Result<()> {
        let target = self.speaker(&node.name)?;
        let live = self.live_speaker_names();
        let followers: Vec<String> = zone
            .speakers
            .iter()
            .filter(|id| **id != node.name && live.contains(id))
            .cloned()
            .collect();

        info!(node = %node.name, ?followers, "restoring zone leader");
        self.speakers.forward_to(&target, &followers).await?;
        self.speakers.toggle_broadcast(&target, true).await?;
        self.speakers
            .change_service_name(&target, &zone.display_name)
            .await
    }

    async fn restore_zone_member(&self, node: &Member, zone: &ZoneConfig) -> Result<()> {
        info!(node = %node.name, zone = %zone.display_name, "re-adding node to zone");
        if zone.leader_id.is_empty() {
            warn!(zone = %zone.display_name, "zone has no leader to forward from");
        } else {
            match self.speaker(&zone.leader_id) {
                Ok(leader) => {
                    self.speakers
                        .forward_to(&leader, &[node.name.clone()])
                        .await?
                }
                Err(e) => warn!(leader = %zone.leader_id, "zone leader unavailable: {}", e),
            }
        }

        // a subordinate must not broadcast on its own
        let target = self.speaker(&node.name)?;
        self.speakers.toggle_broadcast(&target, false).await
    }

    async fn promote_zone_leader(
        &self,
        departed: &str,
        promoted: &str,
        mut zone: ZoneConfig,
    ) -> Result<()> {
        info!(zone = %zone.display_name, leader = promoted, "promoting new zone leader");
        let target = self.speaker(promoted)?;
        let followers: Vec<String> = zone
            .speakers
            .iter()
            .filter(|id| *id != promoted && *id != departed)
            .cloned()
            .collect();

        self.speakers.forward_to(&target, &followers).await?;
        self.speakers
            .change_service_name(&target, &zone.display_name)
            .await?;
        self.speakers.toggle_broadcast(&target, true).await?;

        zone.leader_id = promoted.to_string();
        self.store.save_zone_config(zone).await
    }

    fn live_speaker_names(&self) -> Vec<String> {
        self.members
            .filter_by_role(NodeRole::Music)
            .into_iter()
            .map(|member| member.name)
            .collect()
    }
}
