//! Consensus-facing wrapper around the [`Fsm`]

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    AnyError, EntryPayload, LogId, OptionalSend, Snapshot, SnapshotMeta, StorageError,
    StorageIOError, StoredMembership,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fsm::{Fsm, FsmSnapshot};
use crate::log_store::sto;
use crate::persist::{read_json, write_json};
use crate::types::{Applied, NodeId, StoreNode, TypeConfig};

type StoResult<T> = Result<T, StorageError<NodeId>>;

const SNAPSHOT_DIR: &str = "snapshots";
const RETAIN_SNAPSHOTS: usize = 2;

/// A snapshot as written to `snapshots/<index>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    meta: SnapshotMeta<NodeId, StoreNode>,
    state: FsmSnapshot,
}

impl StoredSnapshot {
    fn to_snapshot(&self) -> StoResult<Snapshot<TypeConfig>> {
        let data = serde_json::to_vec(&self.state).map_err(|e| {
            sto(StorageIOError::read_snapshot(
                Some(self.meta.signature()),
                AnyError::new(&e),
            ))
        })?;
        Ok(Snapshot {
            meta: self.meta.clone(),
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

#[derive(Debug, Default)]
struct AppliedState {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, StoreNode>,
}

/// Applies committed entries to the [`Fsm`] and manages snapshots.
///
/// The map itself is not written to disk on every apply. On restart it is
/// rebuilt from the newest snapshot and the committed log is replayed on top.
#[derive(Debug)]
pub struct StateMachineStore {
    fsm: Arc<Fsm>,
    applied: Mutex<AppliedState>,
    snapshot_dir: PathBuf,
    snapshot_seq: AtomicU64,
    current: Mutex<Option<StoredSnapshot>>,
}

impl StateMachineStore {
    /// Open the state machine, restoring the newest snapshot under `dir`
    pub async fn open(dir: &Path, fsm: Arc<Fsm>) -> StoResult<Arc<Self>> {
        let snapshot_dir = dir.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&snapshot_dir)
            .await
            .map_err(|e| sto(StorageIOError::write_snapshot(None, AnyError::new(&e))))?;

        let store = Self {
            fsm,
            applied: Mutex::new(AppliedState::default()),
            snapshot_dir,
            snapshot_seq: AtomicU64::new(0),
            current: Mutex::new(None),
        };

        if let Some(snapshot) = store.load_newest_snapshot().await? {
            info!(
                snapshot_id = %snapshot.meta.snapshot_id,
                last_log_id = ?snapshot.meta.last_log_id,
                "restoring state machine from snapshot"
            );
            store.fsm.restore(snapshot.state.clone());
            *store.applied.lock() = AppliedState {
                last_applied: snapshot.meta.last_log_id,
                last_membership: snapshot.meta.last_membership.clone(),
            };
            *store.current.lock() = Some(snapshot);
        }

        Ok(Arc::new(store))
    }

    pub fn fsm(&self) -> &Arc<Fsm> {
        &self.fsm
    }

    async fn snapshot_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.snapshot_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                files.push(path);
            }
        }
        // names are zero-padded log indexes
        files.sort();
        Ok(files)
    }

    async fn load_newest_snapshot(&self) -> StoResult<Option<StoredSnapshot>> {
        let files = self
            .snapshot_files()
            .await
            .map_err(|e| sto(StorageIOError::read_snapshot(None, AnyError::new(&e))))?;

        for path in files.iter().rev() {
            match read_json::<StoredSnapshot>(path).await {
                Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), "Skipping unreadable snapshot: {}", e),
            }
        }
        Ok(None)
    }

    async fn persist_snapshot(&self, snapshot: &StoredSnapshot) -> StoResult<()> {
        let index = snapshot.meta.last_log_id.map(|id| id.index).unwrap_or(0);
        let path = self.snapshot_dir.join(format!("{:020}.json", index));
        write_json(&path, snapshot).await.map_err(|e| {
            sto(StorageIOError::write_snapshot(
                Some(snapshot.meta.signature()),
                AnyError::new(&e),
            ))
        })?;

        let files = self
            .snapshot_files()
            .await
            .map_err(|e| sto(StorageIOError::write_snapshot(None, AnyError::new(&e))))?;
        if files.len() > RETAIN_SNAPSHOTS {
            for old in &files[..files.len() - RETAIN_SNAPSHOTS] {
                debug!(path = %old.display(), "removing old snapshot");
                if let Err(e) = tokio::fs::remove_file(old).await {
                    warn!(path = %old.display(), "Failed to remove old snapshot: {}", e);
                }
            }
        }

        *self.current.lock() = Some(snapshot.clone());
        Ok(())
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<StateMachineStore> {
    async fn build_snapshot(&mut self) -> StoResult<Snapshot<TypeConfig>> {
        // map and applied state are read together so the snapshot is consistent
        let (state, last_applied, last_membership) = {
            let applied = self.applied.lock();
            (
                self.fsm.snapshot(),
                applied.last_applied,
                applied.last_membership.clone(),
            )
        };

        let seq = self.snapshot_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot_id = match last_applied {
            Some(id) => format!("{}-{}-{}", id.leader_id, id.index, seq),
            None => format!("--{}", seq),
        };

        let stored = StoredSnapshot {
            meta: SnapshotMeta {
                last_log_id: last_applied,
                last_membership,
                snapshot_id,
            },
            state,
        };
        info!(snapshot_id = %stored.meta.snapshot_id, entries = stored.state.len(), "built snapshot");

        self.persist_snapshot(&stored).await?;
        stored.to_snapshot()
    }
}

impl RaftStateMachine<TypeConfig> for Arc<StateMachineStore> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> StoResult<(Option<LogId<NodeId>>, StoredMembership<NodeId, StoreNode>)> {
        let applied = self.applied.lock();
        Ok((applied.last_applied, applied.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> StoResult<Vec<Applied>>
    where
        I: IntoIterator<Item = openraft::Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let mut responses = Vec::new();

        for entry in entries {
            match entry.payload {
                EntryPayload::Blank => {}
                EntryPayload::Normal(ref command) => self.fsm.apply(command),
                EntryPayload::Membership(ref membership) => {
                    debug!(log_id = %entry.log_id, "applying membership change");
                    self.applied.lock().last_membership =
                        StoredMembership::new(Some(entry.log_id), membership.clone());
                }
            }
            self.applied.lock().last_applied = Some(entry.log_id);
            responses.push(Applied);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> StoResult<Box<Cursor<Vec<u8>>>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, StoreNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> StoResult<()> {
        info!(snapshot_id = %meta.snapshot_id, "installing snapshot from leader");

        let state: FsmSnapshot = serde_json::from_slice(snapshot.get_ref()).map_err(|e| {
            sto(StorageIOError::read_snapshot(
                Some(meta.signature()),
                AnyError::new(&e),
            ))
        })?;

        {
            let mut applied = self.applied.lock();
            self.fsm.restore(state.clone());
            applied.last_applied = meta.last_log_id;
            applied.last_membership = meta.last_membership.clone();
        }

        let stored = StoredSnapshot {
            meta: meta.clone(),
            state,
        };
        self.persist_snapshot(&stored).await
    }

    async fn get_current_snapshot(&mut self) -> StoResult<Option<Snapshot<TypeConfig>>> {
        let current = self.current.lock().clone();
        match current {
            Some(stored) => Ok(Some(stored.to_snapshot()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Command, Entry, SpeakerConfig};
    use openraft::CommittedLeaderId;

    fn normal(index: u64, command: Command) -> openraft::Entry<TypeConfig> {
        openraft::Entry {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(command),
        }
    }

    fn speaker(id: &str) -> Command {
        Command::set(
            id,
            Entry::speaker(SpeakerConfig {
                id: id.to_string(),
                display_name: id.to_uppercase(),
            }),
        )
    }

    #[tokio::test]
    async fn test_apply_tracks_last_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut sm = StateMachineStore::open(dir.path(), Arc::new(Fsm::new()))
            .await
            .unwrap();

        let responses = sm
            .apply(vec![normal(1, speaker("a")), normal(2, speaker("b"))])
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);

        let (last_applied, _) = sm.applied_state().await.unwrap();
        assert_eq!(last_applied.map(|id| id.index), Some(2));
        assert_eq!(sm.fsm().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_restored_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut sm = StateMachineStore::open(dir.path(), Arc::new(Fsm::new()))
            .await
            .unwrap();
        sm.apply(vec![normal(1, speaker("a")), normal(2, speaker("b"))])
            .await
            .unwrap();
        sm.build_snapshot().await.unwrap();

        let mut reopened = StateMachineStore::open(dir.path(), Arc::new(Fsm::new()))
            .await
            .unwrap();
        assert_eq!(reopened.fsm().snapshot(), sm.fsm().snapshot());

        let (last_applied, _) = reopened.applied_state().await.unwrap();
        assert_eq!(last_applied.map(|id| id.index), Some(2));
        assert!(reopened.get_current_snapshot().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_only_two_snapshots_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut sm = StateMachineStore::open(dir.path(), Arc::new(Fsm::new()))
            .await
            .unwrap();

        for index in 1..=4 {
            sm.apply(vec![normal(index, speaker(&format!("s{}", index)))])
                .await
                .unwrap();
            sm.build_snapshot().await.unwrap();
        }

        let files = sm.snapshot_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with(format!("{:020}.json", 4)));
    }

    #[tokio::test]
    async fn test_install_snapshot_replaces_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut leader = StateMachineStore::open(&dir.path().join("leader"), Arc::new(Fsm::new()))
            .await
            .unwrap();
        leader.apply(vec![normal(1, speaker("a"))]).await.unwrap();
        let snapshot = leader.build_snapshot().await.unwrap();

        let mut follower =
            StateMachineStore::open(&dir.path().join("follower"), Arc::new(Fsm::new()))
                .await
                .unwrap();
        follower.apply(vec![normal(1, speaker("stale"))]).await.unwrap();
        follower
            .install_snapshot(&snapshot.meta, snapshot.snapshot)
            .await
            .unwrap();

        assert!(follower.fsm().get("stale").is_none());
        assert!(follower.fsm().get("a").is_some());
    }
}
