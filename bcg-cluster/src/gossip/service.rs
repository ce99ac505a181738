use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::message::{GossipMessage, MemberRecord, NodeState, MAX_DATAGRAM};
use crate::directory::MemberView;
use crate::error::{ClusterError, Result};
use crate::events::{EventDelegate, MemberEvent, MemberObserver};
use crate::member::Member;
use crate::meta::NodeMeta;

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(1);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);
const REAP_TIMEOUT: Duration = Duration::from_secs(30);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`Membership`] instance
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// Unique name of the local node
    pub name: String,
    /// UDP address to bind the gossip socket to
    pub bind_addr: SocketAddr,
    /// Address peers should use; defaults to the bound address
    pub advertise_addr: Option<SocketAddr>,
    /// Metadata advertised for the local node
    pub meta: NodeMeta,
    pub gossip_interval: Duration,
    pub failure_detection_interval: Duration,
    pub suspect_timeout: Duration,
    pub dead_timeout: Duration,
    /// How long dead and departed members stay in the table after they were
    /// last heard from
    pub reap_timeout: Duration,
    pub join_timeout: Duration,
}

impl MembershipConfig {
    pub fn new(name: impl Into<String>, bind_addr: SocketAddr, meta: NodeMeta) -> Self {
        Self {
            name: name.into(),
            bind_addr,
            advertise_addr: None,
            meta,
            gossip_interval: GOSSIP_INTERVAL,
            failure_detection_interval: FAILURE_DETECTION_INTERVAL,
            suspect_timeout: SUSPECT_TIMEOUT,
            dead_timeout: DEAD_TIMEOUT,
            reap_timeout: REAP_TIMEOUT,
            join_timeout: JOIN_TIMEOUT,
        }
    }
}

/// Gossip-based membership directory.
///
/// Keeps the member table in sync with peers over UDP, detects failures with
/// a suspect-then-dead scheme and delivers join, leave and update events to
/// registered observers.
///
/// # Example
///
/// ```no_run
/// use bcg_cluster::{Membership, MembershipConfig, MemberView, NodeMeta, NodeRole};
///
/// # async fn run() -> bcg_cluster::Result<()> {
/// let config = MembershipConfig::new(
///     "mgmt-1",
///     "0.0.0.0:7946".parse().unwrap(),
///     NodeMeta::management(7070, 7080),
/// );
/// let membership = Membership::new(config).await?;
/// membership.start();
/// membership.join("192.168.1.20:7946".parse().unwrap()).await?;
///
/// for speaker in membership.filter_by_role(NodeRole::Music) {
///     println!("{} at {}", speaker.name, speaker.addr);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Membership {
    local_name: String,
    local_addr: SocketAddr,
    local_meta: RwLock<Vec<u8>>,
    incarnation: AtomicU64,
    members: DashMap<String, MemberRecord>,
    socket: UdpSocket,
    events: EventDelegate,
    join_pending: AtomicBool,
    join_ack: Notify,
    gossip_interval: Duration,
    failure_detection_interval: Duration,
    suspect_timeout: Duration,
    dead_timeout: Duration,
    reap_timeout: Duration,
    join_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Membership {
    /// Bind the gossip socket and seed the member table with the local node
    pub async fn new(config: MembershipConfig) -> Result<Arc<Self>> {
        let meta = config.meta.encode()?;
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let local_addr = config.advertise_addr.unwrap_or(socket.local_addr()?);

        let membership = Arc::new(Self {
            local_name: config.name,
            local_addr,
            local_meta: RwLock::new(meta),
            incarnation: AtomicU64::new(1),
            members: DashMap::new(),
            socket,
            events: EventDelegate::new(),
            join_pending: AtomicBool::new(false),
            join_ack: Notify::new(),
            gossip_interval: config.gossip_interval,
            failure_detection_interval: config.failure_detection_interval,
            suspect_timeout: config.suspect_timeout,
            dead_timeout: config.dead_timeout,
            reap_timeout: config.reap_timeout,
            join_timeout: config.join_timeout,
            tasks: Mutex::new(Vec::new()),
        });

        let local = membership.local_record();
        membership.members.insert(local.name.clone(), local);
        Ok(membership)
    }

    /// Start the gossip, receive and failure detection loops
    pub fn start(self: &Arc<Self>) {
        info!(node = %self.local_name, addr = %self.local_addr, "starting membership");

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(self.clone().gossip_loop()));
        tasks.push(tokio::spawn(self.clone().receive_loop()));
        tasks.push(tokio::spawn(self.clone().failure_detection_loop()));
    }

    /// Stop all background loops without telling peers
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn name(&self) -> &str {
        &self.local_name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The local node as peers see it
    pub fn local_member(&self) -> Member {
        self.local_record().to_member()
    }

    /// Add an observer for membership events
    pub fn register_observer(&self, observer: Arc<dyn MemberObserver>) {
        self.events.register(observer);
    }

    /// Join an existing cluster through `seed`.
    ///
    /// Requires [`start`](Self::start) to have been called, since the seed's
    /// answer arrives on the receive loop.
    pub async fn join(&self, seed: SocketAddr) -> Result<()> {
        info!(%seed, "joining cluster");
        self.join_pending.store(true, Ordering::SeqCst);

        let msg = GossipMessage::Join {
            node: self.local_record(),
        };
        if let Err(e) = self.send(&msg, seed).await {
            self.join_pending.store(false, Ordering::SeqCst);
            return Err(ClusterError::Network(format!(
                "Failed to contact seed {}: {}",
                seed, e
            )));
        }

        let answered = tokio::time::timeout(self.join_timeout, self.join_ack.notified()).await;
        self.join_pending.store(false, Ordering::SeqCst);

        match answered {
            Ok(()) => {
                info!(%seed, members = self.members().len(), "joined cluster");
                Ok(())
            }
            Err(_) => Err(ClusterError::Network(format!(
                "seed {} did not answer within {:?}",
                seed, self.join_timeout
            ))),
        }
    }

    /// Replace the local metadata and gossip it to peers
    pub async fn update_meta(&self, meta: NodeMeta) -> Result<()> {
        let encoded = meta.encode()?;
        *self.local_meta.write() = encoded;
        self.incarnation.fetch_add(1, Ordering::SeqCst);

        let local = self.local_record();
        self.members.insert(local.name.clone(), local.clone());
        info!(node = %self.local_name, incarnation = local.incarnation, "updated local metadata");

        self.broadcast(&GossipMessage::Alive { node: local }).await;
        Ok(())
    }

    /// Tell peers we are leaving and stop gossiping
    pub async fn leave(&self) {
        let incarnation = self.incarnation.load(Ordering::SeqCst);
        if let Some(mut local) = self.members.get_mut(&self.local_name) {
            local.state = NodeState::Left;
        }

        info!(node = %self.local_name, "leaving cluster");
        self.broadcast(&GossipMessage::Leave {
            name: self.local_name.clone(),
            incarnation,
        })
        .await;
        self.shutdown();
    }

    fn local_record(&self) -> MemberRecord {
        MemberRecord {
            name: self.local_name.clone(),
            addr: self.local_addr,
            meta: self.local_meta.read().clone(),
            state: NodeState::Alive,
            incarnation: self.incarnation.load(Ordering::SeqCst),
            last_seen: Some(Instant::now()),
        }
    }

    fn table(&self) -> Vec<MemberRecord> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn send(&self, msg: &GossipMessage, target: SocketAddr) -> Result<()> {
        let encoded = msg
            .encode()
            .map_err(|e| ClusterError::Network(format!("Failed to encode message: {}", e)))?;
        self.socket.send_to(&encoded, target).await?;
        Ok(())
    }

    async fn broadcast(&self, msg: &GossipMessage) {
        self.broadcast_except(msg, &self.local_name).await;
    }

    async fn broadcast_except(&self, msg: &GossipMessage, skip: &str) {
        let targets: Vec<(String, SocketAddr)> = self
            .members
            .iter()
            .filter(|entry| {
                let member = entry.value();
                member.name != self.local_name && member.name != skip && member.state.is_live()
            })
            .map(|entry| (entry.key().clone(), entry.value().addr))
            .collect();

        for (name, addr) in targets {
            if let Err(e) = self.send(msg, addr).await {
                warn!(node = %name, "Failed to broadcast: {}", e);
            }
        }
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.gossip_interval);

        loop {
            interval.tick().await;

            let targets: Vec<MemberRecord> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().name != self.local_name && entry.value().state.is_live()
                })
                .map(|entry| entry.value().clone())
                .collect();

            let target = {
                use rand::seq::SliceRandom;
                targets.choose(&mut rand::thread_rng()).cloned()
            };
            let Some(target) = target else {
                continue;
            };

            let msg = GossipMessage::Ping {
                node: self.local_record(),
            };
            match self.send(&msg, target.addr).await {
                Ok(()) => debug!(node = %target.name, "sent ping"),
                Err(e) => warn!(node = %target.name, "Failed to send ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match GossipMessage::decode(&buf[..len]) {
                    Ok(msg) => {
                        let events = self.handle_message(msg, src).await;
                        for event in &events {
                            self.events.dispatch(event);
                        }
                    }
                    Err(e) => {
                        warn!(%src, "Failed to decode gossip message: {}", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to receive gossip packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Vec<MemberEvent> {
        let mut events = Vec::new();

        match msg {
            GossipMessage::Join { node } => {
                let node = with_source(node, src);
                info!(node = %node.name, addr = %node.addr, "node joining through us");
                events.extend(self.merge(node.clone(), true));

                let reply = GossipMessage::Ack {
                    node: self.local_record(),
                    members: self.table(),
                };
                if let Err(e) = self.send(&reply, src).await {
                    warn!(%src, "Failed to answer join: {}", e);
                }
                let name = node.name.clone();
                self.broadcast_except(&GossipMessage::Alive { node }, &name).await;
            }
            GossipMessage::Ping { node } => {
                let node = with_source(node, src);
                self.touch(&node.name);
                events.extend(self.merge(node, false));

                let reply = GossipMessage::Ack {
                    node: self.local_record(),
                    members: self.table(),
                };
                if let Err(e) = self.send(&reply, src).await {
                    warn!(%src, "Failed to send ack: {}", e);
                }
            }
            GossipMessage::Ack { node, members } => {
                let node = with_source(node, src);
                let sender = node.name.clone();
                self.touch(&sender);
                events.extend(self.merge(node, false));

                for record in members {
                    if record.name == sender {
                        continue;
                    }
                    if record.name == self.local_name {
                        self.refute_if_accused(record.incarnation, record.state).await;
                        continue;
                    }
                    events.extend(self.merge(record, false));
                }

                if self.join_pending.load(Ordering::SeqCst) {
                    self.join_ack.notify_one();
                }
            }
            GossipMessage::Suspect { name, incarnation } => {
                if name == self.local_name {
                    self.refute_if_accused(incarnation, NodeState::Suspect).await;
                } else {
                    self.suspect(&name, incarnation);
                }
            }
            GossipMessage::Alive { node } => {
                if node.name == self.local_name {
                    self.refute_if_accused(node.incarnation, node.state).await;
                } else {
                    events.extend(self.merge(node, false));
                }
            }
            GossipMessage::Leave { name, incarnation } => {
                if name == self.local_name {
                    self.refute_if_accused(incarnation, NodeState::Left).await;
                } else {
                    events.extend(self.mark_left(&name, incarnation));
                }
            }
        }

        events
    }

    /// Fold a record into the table and work out what changed.
    ///
    /// A higher incarnation always wins. At equal incarnation the worse state
    /// wins, so only the node itself can clear a suspicion, by bumping its
    /// incarnation. A join is accepted unconditionally, since a restarted
    /// node starts counting again.
    fn merge(&self, mut incoming: MemberRecord, from_join: bool) -> Option<MemberEvent> {
        if incoming.name == self.local_name {
            return None;
        }
        incoming.last_seen = Some(Instant::now());

        match self.members.entry(incoming.name.clone()) {
            Entry::Vacant(slot) => {
                if !incoming.state.is_live() {
                    return None;
                }
                info!(node = %incoming.name, addr = %incoming.addr, "discovered new member");
                let member = incoming.to_member();
                slot.insert(incoming);
                Some(MemberEvent::Join(member))
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let accept = from_join
                    || incoming.incarnation > existing.incarnation
                    || (incoming.incarnation == existing.incarnation
                        && state_rank(incoming.state) > state_rank(existing.state));
                if !accept {
                    return None;
                }

                let was_live = existing.state.is_live();
                let changed = existing.meta != incoming.meta || existing.addr != incoming.addr;
                if from_join {
                    incoming.incarnation = incoming.incarnation.max(existing.incarnation);
                }
                debug!(
                    node = %incoming.name,
                    incarnation = incoming.incarnation,
                    state = ?incoming.state,
                    "updating member"
                );
                *existing = incoming;

                let member = existing.to_member();
                match (was_live, existing.state.is_live()) {
                    (false, true) => {
                        info!(node = %member.name, "member is back");
                        Some(MemberEvent::Join(member))
                    }
                    (true, false) => {
                        info!(node = %member.name, state = ?existing.state, "member is gone");
                        Some(MemberEvent::Leave(member))
                    }
                    (true, true) if changed => Some(MemberEvent::Update(member)),
                    _ => None,
                }
            }
        }
    }

    fn touch(&self, name: &str) {
        if let Some(mut member) = self.members.get_mut(name) {
            member.last_seen = Some(Instant::now());
        }
    }

    fn suspect(&self, name: &str, incarnation: u64) {
        if let Some(mut member) = self.members.get_mut(name) {
            if incarnation >= member.incarnation && member.state == NodeState::Alive {
                info!(node = %name, "member suspected by peer");
                member.state = NodeState::Suspect;
                member.incarnation = incarnation;
            }
        }
    }

    fn mark_left(&self, name: &str, incarnation: u64) -> Option<MemberEvent> {
        let mut member = self.members.get_mut(name)?;
        if incarnation < member.incarnation || !member.state.is_live() {
            return None;
        }

        info!(node = %name, "member left");
        member.state = NodeState::Left;
        member.incarnation = incarnation;
        Some(MemberEvent::Leave(member.to_member()))
    }

    /// Answer a claim about ourselves that is not a plain "alive"
    async fn refute_if_accused(&self, incarnation: u64, state: NodeState) {
        let ours = self.incarnation.load(Ordering::SeqCst);
        let accused = incarnation > ours || (incarnation == ours && state != NodeState::Alive);
        if !accused {
            return;
        }

        let refuted = incarnation.max(ours) + 1;
        self.incarnation.store(refuted, Ordering::SeqCst);
        let local = self.local_record();
        self.members.insert(local.name.clone(), local.clone());
        info!(incarnation = refuted, claimed = ?state, "refuting claim about local node");

        self.broadcast(&GossipMessage::Alive { node: local }).await;
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.failure_detection_interval);

        loop {
            interval.tick().await;
            let (messages, events) = self.sweep(Instant::now());

            for msg in &messages {
                self.broadcast(msg).await;
            }
            for event in &events {
                self.events.dispatch(event);
            }
        }
    }

    /// Age every remote member by its silence: alive turns suspect, suspect
    /// turns dead, and dead or departed records are dropped once the reap
    /// timeout has passed.
    fn sweep(&self, now: Instant) -> (Vec<GossipMessage>, Vec<MemberEvent>) {
        let mut messages = Vec::new();
        let mut events = Vec::new();
        let mut reaped = Vec::new();

        for mut entry in self.members.iter_mut() {
            let member = entry.value_mut();
            if member.name == self.local_name {
                continue;
            }

            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive if elapsed > self.suspect_timeout => {
                    warn!(node = %member.name, ?elapsed, "member suspected");
                    member.state = NodeState::Suspect;
                    messages.push(GossipMessage::Suspect {
                        name: member.name.clone(),
                        incarnation: member.incarnation,
                    });
                }
                NodeState::Suspect if elapsed > self.dead_timeout => {
                    warn!(node = %member.name, ?elapsed, "member declared dead");
                    member.state = NodeState::Dead;
                    events.push(MemberEvent::Leave(member.to_member()));
                }
                NodeState::Dead | NodeState::Left if elapsed > self.reap_timeout => {
                    reaped.push(member.name.clone());
                }
                _ => {}
            }
        }

        for name in reaped {
            debug!(node = %name, "removing departed member");
            self.members.remove(&name);
        }

        (messages, events)
    }
}

impl MemberView for Membership {
    fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|entry| entry.value().state.is_live())
            .map(|entry| entry.value().to_member())
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }
}

/// Fill in the sender's address when it advertised an unspecified one
fn with_source(mut node: MemberRecord, src: SocketAddr) -> MemberRecord {
    if node.addr.ip().is_unspecified() {
        node.addr = SocketAddr::new(src.ip(), node.addr.port());
    }
    node
}

fn state_rank(state: NodeState) -> u8 {
    match state {
        NodeState::Alive => 0,
        NodeState::Suspect => 1,
        NodeState::Dead => 2,
        NodeState::Left => 3,
    }
}
