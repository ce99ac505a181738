//! # Bobcaygeon Store
//!
//! Replicated speaker and zone configuration for management nodes.
//!
//! Every management node runs a [`DistributedStore`]. Writes are committed
//! through a raft log (openraft) so a majority of nodes agree on them before
//! they are applied; reads come straight from the local state machine.
//! Peers talk to each other over plain HTTP, using the routes returned by
//! [`DistributedStore::routes`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use bcg_store::{DistributedStore, SpeakerConfig, StoreConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> bcg_store::Result<()> {
//! let config = StoreConfig::new("mgmt-1", "10.0.0.2:7080", "/var/lib/bcg/raft");
//! let store = DistributedStore::open(config, true).await?;
//! store.wait_for_leader(Duration::from_secs(5)).await?;
//!
//! store
//!     .save_speaker_config(SpeakerConfig {
//!         id: "kitchen".into(),
//!         display_name: "Kitchen".into(),
//!     })
//!     .await?;
//! assert!(store.speaker_config("kitchen").is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fsm;
pub mod http;
pub mod log_store;
pub mod network;
mod persist;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use fsm::{Fsm, FsmSnapshot};
pub use store::{DistributedStore, StoreConfig, APPLY_TIMEOUT};
pub use types::{node_id, Command, Entry, NodeId, Op, SpeakerConfig, StoreNode, TypeConfig, ZoneConfig};
