//! # Bobcaygeon Management
//!
//! A management node keeps the cluster's zones in order. It persists speaker
//! and zone configuration in the replicated store, tells speakers whom to
//! forward audio to, and repairs zones when speakers come and go.
//!
//! The pieces:
//!
//! - [`ZoneService`]: zone and speaker operations. Writes run on the
//!   consensus leader; other nodes forward them there.
//! - [`MemberHandler`]: turns membership events into store joins and zone
//!   repairs.
//! - [`api`]: the HTTP/JSON management API and its client.
//! - [`config`] and [`logging`]: process setup for the `bcg-mgmt` binary.
//!
//! Zone orchestration talks to the outside world through three traits,
//! [`ZoneStore`], [`SpeakerControl`] and [`LeaderForwarder`], plus the
//! cluster's [`MemberView`](bcg_cluster::MemberView).

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod forward;
pub mod handler;
mod healing;
pub mod logging;
pub mod model;
pub mod resolve;
pub mod service;
pub mod zone_store;

pub use api::MgmtClient;
pub use config::MgmtConfig;
pub use control::{SpeakerApiControl, SpeakerControl};
pub use error::{MgmtError, Result};
pub use forward::{ForwardedCall, ForwardedReply, LeaderForwarder};
pub use handler::MemberHandler;
pub use model::{Speaker, Track, Zone};
pub use resolve::{find_speaker, resolve_leader_api_address, SpeakerTarget};
pub use service::ZoneService;
pub use zone_store::ZoneStore;
