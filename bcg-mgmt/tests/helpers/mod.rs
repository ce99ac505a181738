//! In-memory stand-ins for the member directory, the replicated store, the
//! speakers and the leader forwarder

#![allow(dead_code)]

use async_trait::async_trait;
use bcg_cluster::{Member, MemberView, NodeMeta};
use bcg_mgmt::{
    ForwardedCall, ForwardedReply, LeaderForwarder, MgmtError, Result, SpeakerControl,
    SpeakerTarget, Track, ZoneService, ZoneStore,
};
use bcg_store::{SpeakerConfig, ZoneConfig};
use parking_lot::Mutex;
use speaker_api::ApiError;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const SPEAKER_API_PORT: u16 = 7071;
pub const SPEAKER_RTSP_PORT: u16 = 5000;

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn music(name: &str, ip: &str) -> Member {
    Member::new(
        name,
        SocketAddr::new(ip.parse().unwrap(), 7946),
        NodeMeta::music(SPEAKER_RTSP_PORT, SPEAKER_API_PORT)
            .encode()
            .unwrap(),
    )
}

pub fn mgmt(name: &str, ip: &str, api_port: u16, raft_port: u16) -> Member {
    Member::new(
        name,
        SocketAddr::new(ip.parse().unwrap(), 7946),
        NodeMeta::management(api_port, raft_port).encode().unwrap(),
    )
}

pub fn zone(id: &str, name: &str, leader: &str, speakers: &[&str]) -> ZoneConfig {
    ZoneConfig {
        id: id.to_string(),
        display_name: name.to_string(),
        leader_id: leader.to_string(),
        speakers: ids(speakers),
    }
}

/// Poll `check` until it holds or about two seconds have passed
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// Member directory
// ============================================================================

#[derive(Default)]
pub struct FakeMembers {
    members: Mutex<Vec<Member>>,
}

impl FakeMembers {
    pub fn with(members: Vec<Member>) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(members),
        })
    }

    pub fn add(&self, member: Member) {
        self.members.lock().push(member);
    }

    pub fn remove(&self, name: &str) {
        self.members.lock().retain(|m| m.name != name);
    }
}

impl MemberView for FakeMembers {
    fn members(&self) -> Vec<Member> {
        self.members.lock().clone()
    }
}

// ============================================================================
// Replicated store
// ============================================================================

pub struct FakeStore {
    pub leader: Mutex<bool>,
    pub leader_addr: Mutex<Option<String>>,
    pub speakers: Mutex<BTreeMap<String, SpeakerConfig>>,
    pub zones: Mutex<BTreeMap<String, ZoneConfig>>,
    pub joins: Mutex<Vec<(String, String)>>,
    /// Still reports leadership but writes fail, as after losing an election
    pub deposed: Mutex<bool>,
}

impl FakeStore {
    pub fn leader() -> Arc<Self> {
        Arc::new(Self {
            leader: Mutex::new(true),
            leader_addr: Mutex::new(Some("10.0.0.2:7080".to_string())),
            speakers: Mutex::new(BTreeMap::new()),
            zones: Mutex::new(BTreeMap::new()),
            joins: Mutex::new(Vec::new()),
            deposed: Mutex::new(false),
        })
    }

    pub fn follower_of(leader_addr: Option<&str>) -> Arc<Self> {
        let store = Self::leader();
        *store.leader.lock() = false;
        *store.leader_addr.lock() = leader_addr.map(str::to_string);
        store
    }

    pub fn insert_zone(&self, config: ZoneConfig) {
        self.zones.lock().insert(config.id.clone(), config);
    }

    pub fn insert_speaker(&self, id: &str, display_name: &str) {
        self.speakers.lock().insert(
            id.to_string(),
            SpeakerConfig {
                id: id.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }

    pub fn zone(&self, id: &str) -> Option<ZoneConfig> {
        self.zones.lock().get(id).cloned()
    }

    /// Keep answering `am_leader` with yes while a new leader takes over
    pub fn depose(&self, new_leader_addr: &str) {
        *self.deposed.lock() = true;
        *self.leader_addr.lock() = Some(new_leader_addr.to_string());
    }

    fn check_leader(&self) -> Result<()> {
        if *self.leader.lock() && !*self.deposed.lock() {
            Ok(())
        } else {
            Err(MgmtError::NotLeader)
        }
    }
}

#[async_trait]
impl ZoneStore for FakeStore {
    fn am_leader(&self) -> bool {
        *self.leader.lock()
    }

    fn leader(&self) -> Option<String> {
        self.leader_addr.lock().clone()
    }

    fn speaker_config(&self, id: &str) -> Option<SpeakerConfig> {
        self.speakers.lock().get(id).cloned()
    }

    fn zone_configs(&self) -> Vec<ZoneConfig> {
        self.zones.lock().values().cloned().collect()
    }

    async fn save_speaker_config(&self, config: SpeakerConfig) -> Result<()> {
        self.check_leader()?;
        self.speakers.lock().insert(config.id.clone(), config);
        Ok(())
    }

    async fn save_zone_config(&self, config: ZoneConfig) -> Result<()> {
        self.check_leader()?;
        self.zones.lock().insert(config.id.clone(), config);
        Ok(())
    }

    async fn delete_zone_config(&self, id: &str) -> Result<()> {
        self.check_leader()?;
        self.zones.lock().remove(id);
        Ok(())
    }

    async fn join(&self, name: &str, addr: &str) -> Result<()> {
        self.joins.lock().push((name.to_string(), addr.to_string()));
        Ok(())
    }
}

// ============================================================================
// Speakers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerCall {
    ChangeName(String, String),
    Broadcast(String, bool),
    Forward(String, Vec<String>),
    RemoveForward(String, Vec<String>),
    RemoveAllForward(String),
    SetMute(String, bool),
}

/// Remote state of every speaker, as the fake has been told to set it
#[derive(Debug, Clone, Default)]
pub struct SpeakerState {
    pub name: Option<String>,
    pub broadcasting: Option<bool>,
    pub forwards: BTreeSet<String>,
    pub muted: bool,
}

#[derive(Default)]
pub struct FakeSpeakers {
    pub calls: Mutex<Vec<SpeakerCall>>,
    pub state: Mutex<BTreeMap<String, SpeakerState>>,
    /// Calls against this speaker fail
    pub failing: Mutex<Option<String>>,
}

impl FakeSpeakers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, speaker: &str) {
        *self.failing.lock() = Some(speaker.to_string());
    }

    pub fn state(&self, speaker: &str) -> SpeakerState {
        self.state.lock().get(speaker).cloned().unwrap_or_default()
    }

    pub fn forwards(&self, speaker: &str) -> BTreeSet<String> {
        self.state(speaker).forwards
    }

    pub fn calls(&self) -> Vec<SpeakerCall> {
        self.calls.lock().clone()
    }

    pub fn set_forwards(&self, speaker: &str, targets: &[&str]) {
        self.state
            .lock()
            .entry(speaker.to_string())
            .or_default()
            .forwards = set(targets);
    }

    fn record(&self, target: &SpeakerTarget, call: SpeakerCall) -> Result<()> {
        if self.failing.lock().as_deref() == Some(target.id.as_str()) {
            return Err(MgmtError::Api(ApiError::Network(format!(
                "{} is unreachable",
                target.id
            ))));
        }
        assert_eq!(target.api_addr.port(), SPEAKER_API_PORT);

        let mut state = self.state.lock();
        let speaker = state.entry(target.id.clone()).or_default();
        match &call {
            SpeakerCall::ChangeName(_, name) => speaker.name = Some(name.clone()),
            SpeakerCall::Broadcast(_, on) => speaker.broadcasting = Some(*on),
            SpeakerCall::Forward(_, ids) => speaker.forwards.extend(ids.iter().cloned()),
            SpeakerCall::RemoveForward(_, ids) => speaker.forwards.retain(|f| !ids.contains(f)),
            SpeakerCall::RemoveAllForward(_) => speaker.forwards.clear(),
            SpeakerCall::SetMute(_, muted) => speaker.muted = *muted,
        }
        drop(state);

        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl SpeakerControl for FakeSpeakers {
    async fn change_service_name(&self, target: &SpeakerTarget, name: &str) -> Result<()> {
        self.record(target, SpeakerCall::ChangeName(target.id.clone(), name.to_string()))
    }

    async fn toggle_broadcast(&self, target: &SpeakerTarget, should_broadcast: bool) -> Result<()> {
        self.record(target, SpeakerCall::Broadcast(target.id.clone(), should_broadcast))
    }

    async fn forward_to(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()> {
        self.record(target, SpeakerCall::Forward(target.id.clone(), ids.to_vec()))
    }

    async fn remove_forward(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()> {
        self.record(target, SpeakerCall::RemoveForward(target.id.clone(), ids.to_vec()))
    }

    async fn remove_all_forward(&self, target: &SpeakerTarget) -> Result<()> {
        self.record(target, SpeakerCall::RemoveAllForward(target.id.clone()))
    }

    async fn current_track(&self, target: &SpeakerTarget) -> Result<Track> {
        Ok(Track {
            artist: "Bobcaygeon".to_string(),
            album: "Phantom Power".to_string(),
            title: format!("playing on {}", target.id),
            artwork: Vec::new(),
        })
    }

    async fn is_muted(&self, target: &SpeakerTarget) -> Result<bool> {
        Ok(self.state(&target.id).muted)
    }

    async fn set_mute(&self, target: &SpeakerTarget, muted: bool) -> Result<()> {
        assert_eq!(target.rtsp_addr.port(), SPEAKER_RTSP_PORT);
        self.record(target, SpeakerCall::SetMute(target.id.clone(), muted))
    }
}

// ============================================================================
// Leader forwarding
// ============================================================================

#[derive(Default)]
pub struct FakeForwarder {
    pub forwarded: Mutex<Vec<(SocketAddr, ForwardedCall)>>,
}

impl FakeForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl LeaderForwarder for FakeForwarder {
    async fn forward(&self, leader_api: SocketAddr, call: ForwardedCall) -> Result<ForwardedReply> {
        let reply = match &call {
            ForwardedCall::CreateZone { .. } => ForwardedReply::ZoneCreated("from-leader".to_string()),
            _ => ForwardedReply::Done,
        };
        self.forwarded.lock().push((leader_api, call));
        Ok(reply)
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub members: Arc<FakeMembers>,
    pub store: Arc<FakeStore>,
    pub speakers: Arc<FakeSpeakers>,
    pub forwarder: Arc<FakeForwarder>,
    pub service: Arc<ZoneService>,
}

impl Harness {
    pub fn new(members: Vec<Member>, store: Arc<FakeStore>) -> Self {
        let members = FakeMembers::with(members);
        let speakers = FakeSpeakers::new();
        let forwarder = FakeForwarder::new();
        let service = Arc::new(ZoneService::new(
            members.clone(),
            store.clone(),
            speakers.clone(),
            forwarder.clone(),
        ));
        Self {
            members,
            store,
            speakers,
            forwarder,
            service,
        }
    }

    /// Leader node with speakers A, B, C and X live
    pub fn leader() -> Self {
        Self::new(
            vec![
                mgmt("mgmt-1", "10.0.0.2", 7070, 7080),
                music("A", "10.0.0.10"),
                music("B", "10.0.0.11"),
                music("C", "10.0.0.12"),
                music("X", "10.0.0.13"),
            ],
            FakeStore::leader(),
        )
    }
}
