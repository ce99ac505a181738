use openraft::error::{ClientWriteError, InitializeError, RaftError};
use openraft::{ChangeMembers, Config, Raft, SnapshotPolicy, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warp::{Filter, Rejection, Reply};

use crate::error::{Result, StoreError};
use crate::fsm::Fsm;
use crate::http::raft_routes;
use crate::log_store::LogStore;
use crate::network::HttpNetworkFactory;
use crate::state_machine::StateMachineStore;
use crate::types::{node_id, Command, Entry, NodeId, SpeakerConfig, StoreNode, TypeConfig, ZoneConfig};

/// How long a write may wait for its entry to commit
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

const CLUSTER_NAME: &str = "bobcaygeon";
const SNAPSHOT_LOGS: u64 = 1024;
const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for [`DistributedStore::open`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Unique node name; the consensus id is derived from it
    pub name: String,
    /// `host:port` peers use to reach this node's `/raft/*` routes
    pub advertise_addr: String,
    /// Directory for the log, vote and snapshots
    pub storage_dir: PathBuf,
    pub apply_timeout: Duration,
    /// Log entries between snapshots
    pub snapshot_logs: u64,
}

impl StoreConfig {
    pub fn new(
        name: impl Into<String>,
        advertise_addr: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            advertise_addr: advertise_addr.into(),
            storage_dir: storage_dir.into(),
            apply_timeout: APPLY_TIMEOUT,
            snapshot_logs: SNAPSHOT_LOGS,
        }
    }
}

/// Speaker and zone configuration replicated across management nodes.
///
/// Writes go through the raft log and only succeed on the leader; any other
/// node answers them with [`StoreError::NotLeader`]. Reads are served from
/// the local copy, which may lag behind the leader.
pub struct DistributedStore {
    id: NodeId,
    name: String,
    advertise_addr: String,
    apply_timeout: Duration,
    raft: Raft<TypeConfig>,
    fsm: Arc<Fsm>,
}

impl DistributedStore {
    /// Start the local consensus participant.
    ///
    /// With `bootstrap` set, a brand-new single node cluster is formed around
    /// this node. Only the first management node of a deployment should do
    /// that; the others wait for the leader to add them.
    pub async fn open(config: StoreConfig, bootstrap: bool) -> Result<Self> {
        let id = node_id(&config.name);
        info!(
            node = %config.name,
            id,
            addr = %config.advertise_addr,
            dir = %config.storage_dir.display(),
            bootstrap,
            "opening replicated store"
        );

        let raft_config = Config {
            cluster_name: CLUSTER_NAME.to_string(),
            heartbeat_interval: 250,
            election_timeout_min: 1000,
            election_timeout_max: 2000,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(config.snapshot_logs),
            ..Default::default()
        }
        .validate()
        .map_err(|e| StoreError::Raft(format!("invalid raft config: {}", e)))?;

        let log_store = LogStore::open(&config.storage_dir)
            .await
            .map_err(storage_error)?;
        let fsm = Arc::new(Fsm::new());
        let state_machine = StateMachineStore::open(&config.storage_dir, fsm.clone())
            .await
            .map_err(storage_error)?;

        let client = reqwest::Client::builder()
            .connect_timeout(RPC_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Raft(format!("Failed to create HTTP client: {}", e)))?;
        let network = HttpNetworkFactory::new(client);

        let raft = Raft::new(id, Arc::new(raft_config), network, log_store, state_machine)
            .await
            .map_err(|e| StoreError::Raft(e.to_string()))?;

        if bootstrap {
            let mut nodes = BTreeMap::new();
            nodes.insert(id, StoreNode::new(&config.name, &config.advertise_addr));
            match raft.initialize(nodes).await {
                Ok(()) => info!("bootstrapped single node cluster"),
                Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {
                    info!("raft state already present, not bootstrapping")
                }
                Err(e) => return Err(StoreError::Raft(e.to_string())),
            }
        }

        Ok(Self {
            id,
            name: config.name,
            advertise_addr: config.advertise_addr,
            apply_timeout: config.apply_timeout,
            raft,
            fsm,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn advertise_addr(&self) -> &str {
        &self.advertise_addr
    }

    pub fn raft(&self) -> &Raft<TypeConfig> {
        &self.raft
    }

    /// The `/raft/*` routes peers replicate through
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        raft_routes(self.raft.clone())
    }

    /// Consensus address of the current leader, if one is known
    pub fn leader(&self) -> Option<String> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = metrics.current_leader?;
        let addr = metrics
            .membership_config
            .membership()
            .nodes()
            .find(|(id, _)| **id == leader)
            .map(|(_, node)| node.addr.clone());
        addr
    }

    pub fn am_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.id)
    }

    /// Wait until some node holds leadership and return its address
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<String> {
        self.raft
            .wait(Some(timeout))
            .metrics(|m| m.current_leader.is_some(), "leader elected")
            .await
            .map_err(|_| StoreError::Timeout)?;
        self.leader().ok_or(StoreError::NotLeader)
    }

    /// Add a management node to the consensus group.
    ///
    /// Only the leader acts; other nodes return `Ok` without doing anything.
    /// Joining twice with the same name and address is a no-op. A node that
    /// reuses the name or the address of an existing member replaces it.
    pub async fn join(&self, name: &str, addr: &str) -> Result<()> {
        info!(node = name, addr, "received join request");

        if !self.am_leader() {
            info!("not leader, ignoring join request");
            return Ok(());
        }

        let joining = node_id(name);
        let metrics = self.raft.metrics().borrow().clone();
        let membership = metrics.membership_config.membership();
        let voters: BTreeSet<NodeId> = membership.voter_ids().collect();

        let mut stale_voters = BTreeSet::new();
        let mut stale_learners = BTreeSet::new();
        for (id, node) in membership.nodes() {
            if *id != joining && node.addr != addr {
                continue;
            }
            if *id == joining && node.addr == addr && voters.contains(id) {
                info!(node = name, addr, "already a member, ignoring join request");
                return Ok(());
            }
            if voters.contains(id) {
                stale_voters.insert(*id);
            } else {
                stale_learners.insert(*id);
            }
        }

        if !stale_voters.is_empty() {
            info!(?stale_voters, "removing voters replaced by the joining node");
            self.bounded(self.raft.change_membership(ChangeMembers::RemoveVoters(stale_voters), false))
                .await?
                .map_err(write_error)?;
        }
        if !stale_learners.is_empty() {
            debug!(?stale_learners, "removing learners replaced by the joining node");
            self.bounded(self.raft.change_membership(ChangeMembers::RemoveNodes(stale_learners), false))
                .await?
                .map_err(write_error)?;
        }

        self.bounded(self.raft.add_learner(joining, StoreNode::new(name, addr), false))
            .await?
            .map_err(write_error)?;
        self.bounded(self.raft.change_membership(
            ChangeMembers::AddVoterIds(BTreeSet::from([joining])),
            false,
        ))
        .await?
        .map_err(write_error)?;

        info!(node = name, addr, "node joined successfully");
        Ok(())
    }

    pub fn speaker_config(&self, id: &str) -> Option<SpeakerConfig> {
        self.fsm.speaker_config(id)
    }

    pub fn zone_config(&self, id: &str) -> Option<ZoneConfig> {
        self.fsm.get(id).filter(Entry::is_zone).map(|entry| entry.zone_config)
    }

    /// All persisted zones, ordered by id
    pub fn zone_configs(&self) -> Vec<ZoneConfig> {
        self.fsm.zone_configs()
    }

    pub async fn save_speaker_config(&self, config: SpeakerConfig) -> Result<()> {
        let key = config.id.clone();
        self.apply(Command::set(key, Entry::speaker(config))).await
    }

    pub async fn save_zone_config(&self, config: ZoneConfig) -> Result<()> {
        let key = config.id.clone();
        self.apply(Command::set(key, Entry::zone(config))).await
    }

    pub async fn delete_zone_config(&self, id: &str) -> Result<()> {
        self.apply(Command::delete(id)).await
    }

    async fn apply(&self, command: Command) -> Result<()> {
        if !self.am_leader() {
            return Err(StoreError::NotLeader);
        }

        debug!(key = %command.key, op = ?command.op, "replicating command");
        self.bounded(self.raft.client_write(command))
            .await?
            .map_err(write_error)?;
        Ok(())
    }

    /// Bound how long the caller waits; the write itself may still commit
    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::time::timeout(self.apply_timeout, fut)
            .await
            .map_err(|_| {
                warn!(timeout = ?self.apply_timeout, "raft request timed out");
                StoreError::Timeout
            })
    }

    /// Stop the consensus participant
    pub async fn shutdown(&self) -> Result<()> {
        info!(node = %self.name, "shutting down replicated store");
        self.raft
            .shutdown()
            .await
            .map_err(|e| StoreError::Raft(e.to_string()))
    }
}

fn storage_error(e: StorageError<NodeId>) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn write_error(e: RaftError<NodeId, ClientWriteError<NodeId, StoreNode>>) -> StoreError {
    match e {
        RaftError::APIError(ClientWriteError::ForwardToLeader(_)) => StoreError::NotLeader,
        other => StoreError::Raft(other.to_string()),
    }
}
