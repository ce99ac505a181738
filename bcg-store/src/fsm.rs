//! The deterministic state machine behind the replicated store

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::types::{Command, Entry, Op, SpeakerConfig, ZoneConfig};

/// Full copy of the map, as carried by snapshots
pub type FsmSnapshot = BTreeMap<String, Entry>;

/// Map from entity id to [`Entry`], mutated only by committed commands.
///
/// One lock guards every read, apply, snapshot and restore.
#[derive(Debug, Default)]
pub struct Fsm {
    state: Mutex<BTreeMap<String, Entry>>,
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply(&self, command: &Command) {
        match command.op {
            Op::Set => self.apply_set(&command.key, command.value.clone()),
            Op::Delete => self.apply_delete(&command.key),
        }
    }

    fn apply_set(&self, key: &str, value: Entry) {
        debug!(key, zone = value.is_zone(), "applying set");
        self.state.lock().insert(key.to_string(), value);
    }

    fn apply_delete(&self, key: &str) {
        debug!(key, "applying delete");
        if self.state.lock().remove(key).is_none() {
            warn!(key, "delete for unknown key");
        }
    }

    /// Copy of the current map
    pub fn snapshot(&self) -> FsmSnapshot {
        self.state.lock().clone()
    }

    /// Replace the whole map; nothing of the previous state survives
    pub fn restore(&self, snapshot: FsmSnapshot) {
        *self.state.lock() = snapshot;
    }

    /// Replace the whole map from a serialized snapshot
    pub fn restore_from_slice(&self, data: &[u8]) -> serde_json::Result<()> {
        let snapshot: FsmSnapshot = serde_json::from_slice(data)?;
        self.restore(snapshot);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Entry> {
        self.state.lock().get(key).cloned()
    }

    pub fn speaker_config(&self, id: &str) -> Option<SpeakerConfig> {
        self.state
            .lock()
            .get(id)
            .filter(|entry| !entry.is_zone())
            .map(|entry| entry.speaker_config.clone())
    }

    /// All zones, ordered by id
    pub fn zone_configs(&self) -> Vec<ZoneConfig> {
        self.state
            .lock()
            .values()
            .filter(|entry| entry.is_zone())
            .map(|entry| entry.zone_config.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }
}
