//! # Bobcaygeon Cluster
//!
//! Membership directory for a bobcaygeon cluster. Every node (music,
//! management or frontend) joins the same gossip ring and advertises a small
//! [`NodeMeta`] record describing its role and service ports.
//!
//! The directory offers an eventually consistent view of the live members
//! through [`MemberView`] and pushes join, leave and update events to any
//! registered [`MemberObserver`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use bcg_cluster::{Membership, MembershipConfig, MemberView, NodeMeta, NodeRole};
//!
//! # async fn run() -> bcg_cluster::Result<()> {
//! let config = MembershipConfig::new(
//!     "kitchen",
//!     "0.0.0.0:7946".parse().unwrap(),
//!     NodeMeta::music(5000, 7070),
//! );
//! let membership = Membership::new(config).await?;
//! membership.start();
//!
//! let managers = membership.filter_by_role(NodeRole::Management);
//! println!("{} management nodes", managers.len());
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod events;
pub mod gossip;
pub mod member;
pub mod meta;

pub use directory::{filter_by_role, MemberView};
pub use error::{ClusterError, DecodeError, Result};
pub use events::{EventDelegate, MemberEvent, MemberObserver};
pub use gossip::{Membership, MembershipConfig};
pub use member::Member;
pub use meta::{NodeMeta, NodeRole, META_MAX_SIZE};
