//! Durable raft log, vote and commit index

use openraft::storage::{LogFlushed, RaftLogReader, RaftLogStorage};
use openraft::{AnyError, LogId, LogState, OptionalSend, StorageError, StorageIOError, Vote};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::persist::{read_json, write_json};
use crate::types::{NodeId, TypeConfig};

type Entry = openraft::Entry<TypeConfig>;
type StoResult<T> = Result<T, StorageError<NodeId>>;

const LOG_FILE: &str = "log.json";
const VOTE_FILE: &str = "vote.json";
const COMMITTED_FILE: &str = "committed.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogFile {
    last_purged_log_id: Option<LogId<NodeId>>,
    entries: BTreeMap<u64, Entry>,
}

pub(crate) fn sto(err: StorageIOError<NodeId>) -> StorageError<NodeId> {
    StorageError::from(err)
}

#[derive(Debug)]
struct LogStoreInner {
    dir: PathBuf,
    log: LogFile,
    vote: Option<Vote<NodeId>>,
    committed: Option<LogId<NodeId>>,
}

impl LogStoreInner {
    async fn flush_log(&self) -> StoResult<()> {
        write_json(&self.dir.join(LOG_FILE), &self.log)
            .await
            .map_err(|e| sto(StorageIOError::write_logs(AnyError::new(&e))))
    }
}

/// Raft log kept in memory and mirrored to `log.json`.
///
/// The vote and the commit index live in their own files so they can be
/// saved without rewriting the log.
#[derive(Debug, Clone)]
pub struct LogStore {
    inner: Arc<Mutex<LogStoreInner>>,
}

impl LogStore {
    /// Load whatever a previous run left in `dir`
    pub async fn open(dir: &Path) -> StoResult<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| sto(StorageIOError::write_logs(AnyError::new(&e))))?;

        let log = read_json::<LogFile>(&dir.join(LOG_FILE))
            .await
            .map_err(|e| sto(StorageIOError::read_logs(AnyError::new(&e))))?
            .unwrap_or_default();
        let vote = read_json::<Vote<NodeId>>(&dir.join(VOTE_FILE))
            .await
            .map_err(|e| sto(StorageIOError::read_vote(AnyError::new(&e))))?;
        let committed = read_json::<Option<LogId<NodeId>>>(&dir.join(COMMITTED_FILE))
            .await
            .map_err(|e| sto(StorageIOError::read_logs(AnyError::new(&e))))?
            .flatten();

        debug!(
            entries = log.entries.len(),
            last_purged = ?log.last_purged_log_id,
            "opened raft log"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(LogStoreInner {
                dir: dir.to_path_buf(),
                log,
                vote,
                committed,
            })),
        })
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> StoResult<Vec<Entry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .log
            .entries
            .range(range)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> StoResult<LogState<TypeConfig>> {
        let inner = self.inner.lock().await;
        let last_purged_log_id = inner.log.last_purged_log_id;
        let last_log_id = inner
            .log
            .entries
            .values()
            .next_back()
            .map(|entry| entry.log_id)
            .or(last_purged_log_id);

        Ok(LogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> StoResult<()> {
        let mut inner = self.inner.lock().await;
        write_json(&inner.dir.join(VOTE_FILE), vote)
            .await
            .map_err(|e| sto(StorageIOError::write_vote(AnyError::new(&e))))?;
        inner.vote = Some(vote.clone());
        Ok(())
    }

    async fn read_vote(&mut self) -> StoResult<Option<Vote<NodeId>>> {
        Ok(self.inner.lock().await.vote.clone())
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<NodeId>>,
    ) -> StoResult<()> {
        let mut inner = self.inner.lock().await;
        write_json(&inner.dir.join(COMMITTED_FILE), &committed)
            .await
            .map_err(|e| sto(StorageIOError::write_logs(AnyError::new(&e))))?;
        inner.committed = committed;
        Ok(())
    }

    async fn read_committed(&mut self) -> StoResult<Option<LogId<NodeId>>> {
        Ok(self.inner.lock().await.committed)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> StoResult<()>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let mut inner = self.inner.lock().await;
        for entry in entries {
            inner.log.entries.insert(entry.log_id.index, entry);
        }

        let flushed = inner.flush_log().await;
        match &flushed {
            Ok(()) => callback.log_io_completed(Ok(())),
            Err(e) => callback.log_io_completed(Err(std::io::Error::other(e.to_string()))),
        }
        flushed
    }

    async fn truncate(&mut self, log_id: LogId<NodeId>) -> StoResult<()> {
        debug!(?log_id, "truncating raft log");
        let mut inner = self.inner.lock().await;
        inner.log.entries.split_off(&log_id.index);
        inner.flush_log().await
    }

    async fn purge(&mut self, log_id: LogId<NodeId>) -> StoResult<()> {
        debug!(?log_id, "purging raft log");
        let mut inner = self.inner.lock().await;
        let keep = inner.log.entries.split_off(&(log_id.index + 1));
        inner.log.entries = keep;
        inner.log.last_purged_log_id = Some(log_id);
        inner.flush_log().await
    }
}
