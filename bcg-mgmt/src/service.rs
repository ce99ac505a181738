//! Zone orchestration
//!
//! Every mutating operation runs on the consensus leader. A follower resolves
//! the leader's management API through the member directory and forwards the
//! call there. Calls to speakers within one operation are issued one at a
//! time; the first failure aborts the operation and nothing that already
//! happened on the speakers is rolled back. Each step resets the state it
//! touches before applying it, so retrying a failed operation is safe.
//! That also covers leadership moving while an operation runs: when the
//! final write is refused with `NotLeader`, the whole call is forwarded to
//! the new leader and replayed there.

use bcg_cluster::{MemberView, NodeRole};
use bcg_store::ZoneConfig;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::control::SpeakerControl;
use crate::error::{MgmtError, Result};
use crate::forward::{ForwardedCall, ForwardedReply, LeaderForwarder};
use crate::model::{Speaker, Track, Zone};
use crate::resolve::{find_speaker, resolve_leader_api_address, SpeakerTarget};
use crate::zone_store::ZoneStore;

/// Zone and speaker operations of a management node
pub struct ZoneService {
    pub(crate) members: Arc<dyn MemberView>,
    pub(crate) store: Arc<dyn ZoneStore>,
    pub(crate) speakers: Arc<dyn SpeakerControl>,
    forwarder: Arc<dyn LeaderForwarder>,
    local_ips: Vec<IpAddr>,
}

impl ZoneService {
    pub fn new(
        members: Arc<dyn MemberView>,
        store: Arc<dyn ZoneStore>,
        speakers: Arc<dyn SpeakerControl>,
        forwarder: Arc<dyn LeaderForwarder>,
    ) -> Self {
        Self {
            members,
            store,
            speakers,
            forwarder,
            local_ips: Vec::new(),
        }
    }

    /// Addresses of this host, used to recognise a leader advertised without an IP
    pub fn with_local_ips(mut self, local_ips: Vec<IpAddr>) -> Self {
        self.local_ips = local_ips;
        self
    }

    /// Live music nodes, with their persisted display names
    pub fn get_speakers(&self) -> Vec<Speaker> {
        self.members
            .filter_by_role(NodeRole::Music)
            .into_iter()
            .map(|member| {
                let display_name = self
                    .store
                    .speaker_config(&member.name)
                    .map(|config| config.display_name)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| member.name.clone());
                Speaker {
                    id: member.name,
                    display_name,
                }
            })
            .collect()
    }

    /// Persisted zones with their live speakers
    pub fn get_zones(&self) -> Vec<Zone> {
        let speakers = self.get_speakers();
        self.store
            .zone_configs()
            .into_iter()
            .map(|config| Zone {
                speakers: config
                    .speakers
                    .iter()
                    .filter_map(|id| speakers.iter().find(|s| &s.id == id).cloned())
                    .collect(),
                id: config.id,
                display_name: config.display_name,
                leader_id: config.leader_id,
            })
            .collect()
    }

    /// Change the user visible name of a speaker.
    ///
    /// With `update_remote` the speaker is renamed first and the name is
    /// only persisted once that succeeded.
    pub async fn set_display_name(
        &self,
        speaker_id: &str,
        display_name: &str,
        update_remote: bool,
    ) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::SetDisplayName {
                    speaker_id: speaker_id.to_string(),
                    display_name: display_name.to_string(),
                    update_remote,
                })
                .await
                .map(|_| ());
        }

        let mut config = self.store.speaker_config(speaker_id).unwrap_or_default();
        if config.id.is_empty() {
            config.id = speaker_id.to_string();
        }

        if update_remote {
            let target = self.speaker(speaker_id)?;
            self.speakers.change_service_name(&target, display_name).await?;
        }

        config.display_name = display_name.to_string();
        let saved = self.store.save_speaker_config(config).await;
        self.or_forward(saved, || ForwardedCall::SetDisplayName {
            speaker_id: speaker_id.to_string(),
            display_name: display_name.to_string(),
            update_remote,
        })
        .await
    }

    /// Create a zone; the first speaker listed becomes its leader
    pub async fn create_zone(&self, display_name: &str, speaker_ids: &[String]) -> Result<String> {
        if !self.store.am_leader() {
            return self.forward_create_zone(display_name, speaker_ids).await;
        }

        let speaker_ids = unique(speaker_ids);
        let zone = ZoneConfig {
            id: new_zone_id(),
            display_name: display_name.to_string(),
            leader_id: speaker_ids.first().cloned().unwrap_or_default(),
            speakers: speaker_ids.clone(),
        };
        info!(zone = %zone.id, name = display_name, leader = %zone.leader_id, "creating zone");

        for speaker_id in &speaker_ids {
            let target = self.speaker(speaker_id)?;
            debug!(speaker = %speaker_id, "clearing forward targets");
            self.speakers.remove_all_forward(&target).await?;

            if *speaker_id == zone.leader_id {
                self.speakers.change_service_name(&target, display_name).await?;
                self.speakers.toggle_broadcast(&target, true).await?;
            } else {
                self.speakers.toggle_broadcast(&target, false).await?;
            }
        }

        if !speaker_ids.is_empty() {
            // a speaker belongs to at most one forwarding tree
            self.remove_from_all_speakers(&speaker_ids).await?;

            let leader = self.speaker(&zone.leader_id)?;
            let followers = without(&speaker_ids, &zone.leader_id);
            info!(leader = %zone.leader_id, ?followers, "configuring zone forwarding");
            self.speakers.forward_to(&leader, &followers).await?;
        }

        let id = zone.id.clone();
        match self.store.save_zone_config(zone).await {
            Ok(()) => Ok(id),
            Err(MgmtError::NotLeader) => {
                warn!(zone = %id, "lost leadership before the zone was saved");
                self.forward_create_zone(display_name, speaker_ids.as_slice()).await
            }
            Err(e) => Err(e),
        }
    }

    async fn forward_create_zone(&self, display_name: &str, speaker_ids: &[String]) -> Result<String> {
        let reply = self
            .forward(ForwardedCall::CreateZone {
                display_name: display_name.to_string(),
                speaker_ids: speaker_ids.to_vec(),
            })
            .await?;
        match reply {
            ForwardedReply::ZoneCreated(id) => Ok(id),
            ForwardedReply::Done => Err(MgmtError::Forwarded {
                code: 500,
                message: "leader did not return a zone id".to_string(),
            }),
        }
    }

    pub async fn add_speakers_to_zone(&self, zone_id: &str, speaker_ids: &[String]) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::AddSpeakersToZone {
                    zone_id: zone_id.to_string(),
                    speaker_ids: speaker_ids.to_vec(),
                })
                .await
                .map(|_| ());
        }
        if speaker_ids.is_empty() {
            return Ok(());
        }

        let mut zone = self.zone(zone_id)?;
        if zone.leader_id.is_empty() {
            return Err(MgmtError::NotFound(format!("leader of zone {}", zone_id)));
        }

        let additions = without(&unique(speaker_ids), &zone.leader_id);
        if additions.is_empty() {
            return Ok(());
        }
        info!(zone = %zone.id, ?additions, "adding speakers to zone");

        for speaker_id in &additions {
            let target = self.speaker(speaker_id)?;
            self.speakers.remove_all_forward(&target).await?;
            self.speakers.toggle_broadcast(&target, false).await?;
        }

        self.remove_from_all_speakers(&additions).await?;

        let leader = self.speaker(&zone.leader_id)?;
        self.speakers.forward_to(&leader, &additions).await?;

        for speaker_id in additions {
            if !zone.speakers.contains(&speaker_id) {
                zone.speakers.push(speaker_id);
            }
        }
        let saved = self.store.save_zone_config(zone).await;
        self.or_forward(saved, || ForwardedCall::AddSpeakersToZone {
            zone_id: zone_id.to_string(),
            speaker_ids: speaker_ids.to_vec(),
        })
        .await
    }

    /// Take speakers out of a zone and let them broadcast on their own again.
    ///
    /// The zone leader cannot be removed this way; it is skipped.
    pub async fn remove_speakers_from_zone(&self, zone_id: &str, speaker_ids: &[String]) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::RemoveSpeakersFromZone {
                    zone_id: zone_id.to_string(),
                    speaker_ids: speaker_ids.to_vec(),
                })
                .await
                .map(|_| ());
        }
        if speaker_ids.is_empty() {
            return Ok(());
        }

        let mut zone = self.zone(zone_id)?;
        if speaker_ids.contains(&zone.leader_id) {
            info!(zone = %zone.id, leader = %zone.leader_id, "not removing the zone leader");
        }
        let removals: Vec<String> = unique(speaker_ids)
            .into_iter()
            .filter(|id| *id != zone.leader_id && zone.speakers.contains(id))
            .collect();
        if removals.is_empty() {
            return Ok(());
        }
        info!(zone = %zone.id, ?removals, "removing speakers from zone");

        for speaker_id in &removals {
            let target = self.speaker(speaker_id)?;
            self.speakers.toggle_broadcast(&target, true).await?;
        }

        if !zone.leader_id.is_empty() {
            let leader = self.speaker(&zone.leader_id)?;
            self.speakers.remove_forward(&leader, &removals).await?;
        }

        zone.speakers.retain(|id| !removals.contains(id));
        let saved = self.store.save_zone_config(zone).await;
        self.or_forward(saved, || ForwardedCall::RemoveSpeakersFromZone {
            zone_id: zone_id.to_string(),
            speaker_ids: speaker_ids.to_vec(),
        })
        .await
    }

    /// Dissolve a zone, giving every member its own broadcast back
    pub async fn delete_zone(&self, zone_id: &str) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::DeleteZone {
                    zone_id: zone_id.to_string(),
                })
                .await
                .map(|_| ());
        }

        let zone = self.zone(zone_id)?;
        info!(zone = %zone.id, name = %zone.display_name, "deleting zone");

        for speaker_id in without(&zone.speakers, &zone.leader_id) {
            let target = self.speaker(&speaker_id)?;
            self.speakers.toggle_broadcast(&target, true).await?;
        }

        if !zone.leader_id.is_empty() {
            let leader = self.speaker(&zone.leader_id)?;
            self.speakers.remove_all_forward(&leader).await?;

            let own_name = self
                .store
                .speaker_config(&zone.leader_id)
                .map(|config| config.display_name)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| zone.leader_id.clone());
            info!(speaker = %zone.leader_id, from = %zone.display_name, to = %own_name, "restoring service name");
            self.speakers.change_service_name(&leader, &own_name).await?;
        }

        let deleted = self.store.delete_zone_config(&zone.id).await;
        self.or_forward(deleted, || ForwardedCall::DeleteZone {
            zone_id: zone_id.to_string(),
        })
        .await
    }

    pub async fn change_zone_name(&self, zone_id: &str, display_name: &str) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::ChangeZoneName {
                    zone_id: zone_id.to_string(),
                    display_name: display_name.to_string(),
                })
                .await
                .map(|_| ());
        }

        let mut zone = self.zone(zone_id)?;
        if !zone.leader_id.is_empty() {
            let leader = self.speaker(&zone.leader_id)?;
            info!(speaker = %zone.leader_id, from = %zone.display_name, to = display_name, "renaming zone");
            self.speakers.change_service_name(&leader, display_name).await?;
        }

        zone.display_name = display_name.to_string();
        let saved = self.store.save_zone_config(zone).await;
        self.or_forward(saved, || ForwardedCall::ChangeZoneName {
            zone_id: zone_id.to_string(),
            display_name: display_name.to_string(),
        })
        .await
    }

    /// What the zone leader is playing
    pub async fn get_track_for_zone(&self, zone_id: &str) -> Result<Track> {
        let zone = self.zone(zone_id)?;
        if zone.leader_id.is_empty() {
            return Err(MgmtError::NotFound(format!("leader of zone {}", zone_id)));
        }
        let leader = self.speaker(&zone.leader_id)?;
        self.speakers.current_track(&leader).await
    }

    pub async fn get_track_for_speaker(&self, speaker_id: &str) -> Result<Track> {
        let target = self.speaker(speaker_id)?;
        self.speakers.current_track(&target).await
    }

    /// Hard mute or unmute a speaker through its audio transport
    pub async fn set_mute_for_speaker(&self, speaker_id: &str, is_muted: bool) -> Result<()> {
        if !self.store.am_leader() {
            return self
                .forward(ForwardedCall::SetMute {
                    speaker_id: speaker_id.to_string(),
                    is_muted,
                })
                .await
                .map(|_| ());
        }

        let target = self.speaker(speaker_id)?;
        self.speakers.set_mute(&target, is_muted).await
    }

    pub async fn get_is_muted_for_speaker(&self, speaker_id: &str) -> Result<bool> {
        let target = self.speaker(speaker_id)?;
        self.speakers.is_muted(&target).await
    }

    /// Management API address of the consensus leader
    pub fn leader_api_address(&self) -> Result<SocketAddr> {
        let leader = self
            .store
            .leader()
            .ok_or_else(|| MgmtError::Resolution("no consensus leader elected".to_string()))?;
        resolve_leader_api_address(&leader, &self.members.members(), &self.local_ips)
    }

    async fn forward(&self, call: ForwardedCall) -> Result<ForwardedReply> {
        let leader_api = self.leader_api_address()?;
        info!(%leader_api, ?call, "forwarding request to leader");
        self.forwarder.forward(leader_api, call).await
    }

    /// Replay `call` on the new leader when the write was refused because
    /// leadership moved after the operation started
    async fn or_forward(&self, written: Result<()>, call: impl FnOnce() -> ForwardedCall) -> Result<()> {
        match written {
            Err(MgmtError::NotLeader) => {
                warn!("lost leadership before the write committed");
                self.forward(call()).await.map(|_| ())
            }
            other => other,
        }
    }

    pub(crate) fn speaker(&self, speaker_id: &str) -> Result<SpeakerTarget> {
        find_speaker(&self.members.members(), speaker_id)
    }

    fn zone(&self, zone_id: &str) -> Result<ZoneConfig> {
        self.store
            .zone_configs()
            .into_iter()
            .find(|zone| zone.id == zone_id)
            .ok_or_else(|| MgmtError::NotFound(format!("zone {}", zone_id)))
    }

    /// Make sure no live speaker still forwards to any of `speaker_ids`
    pub(crate) async fn remove_from_all_speakers(&self, speaker_ids: &[String]) -> Result<()> {
        for speaker in self.get_speakers() {
            debug!(speaker = %speaker.id, ?speaker_ids, "removing forward targets");
            let target = self.speaker(&speaker.id)?;
            self.speakers.remove_forward(&target, speaker_ids).await?;
        }
        Ok(())
    }
}

/// Opaque zone id
fn new_zone_id() -> String {
    rand::thread_rng().gen_range(0..i64::MAX).to_string()
}

/// Drop repeated ids, keeping first occurrences in order
fn unique(ids: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(id.clone());
        }
    }
    seen
}

fn without(ids: &[String], excluded: &str) -> Vec<String> {
    ids.iter().filter(|id| *id != excluded).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_unique_keeps_first_occurrence() {
        assert_eq!(unique(&ids(&["a", "b", "a", "c", "b"])), ids(&["a", "b", "c"]));
        assert!(unique(&[]).is_empty());
    }

    #[test]
    fn test_without() {
        assert_eq!(without(&ids(&["a", "b", "c"]), "a"), ids(&["b", "c"]));
        assert_eq!(without(&ids(&["a", "b"]), ""), ids(&["a", "b"]));
    }

    proptest! {
        #[test]
        fn test_unique_is_an_ordered_dedup(values in proptest::collection::vec("[a-d]", 0..12)) {
            let deduped = unique(&values);

            let mut expected = Vec::new();
            for value in &values {
                if !expected.contains(value) {
                    expected.push(value.clone());
                }
            }
            prop_assert_eq!(&deduped, &expected);
            prop_assert_eq!(unique(&deduped), deduped);
        }

        #[test]
        fn test_without_removes_only_the_excluded_id(
            values in proptest::collection::vec("[a-d]", 0..12),
            excluded in "[a-e]",
        ) {
            let kept = without(&values, &excluded);

            prop_assert!(!kept.contains(&excluded));
            prop_assert_eq!(
                kept.len(),
                values.iter().filter(|v| **v != excluded).count()
            );
            let mut rest = values.iter().filter(|v| **v != excluded);
            prop_assert!(kept.iter().all(|k| rest.next() == Some(k)));
        }
    }

    #[test]
    fn test_zone_ids_are_numeric_and_distinct() {
        let a = new_zone_id();
        let b = new_zone_id();
        assert!(a.parse::<i64>().is_ok());
        assert_ne!(a, b);
    }
}
