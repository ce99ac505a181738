//! Reactions to cluster membership events

use bcg_cluster::{Member, MemberObserver, NodeMeta, NodeRole};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::service::ZoneService;
use crate::zone_store::ZoneStore;

/// Routes membership events to the store and the zone service.
///
/// Callbacks arrive on the gossip receive path, so all real work is spawned
/// onto the runtime.
pub struct MemberHandler {
    store: Arc<dyn ZoneStore>,
    service: Arc<ZoneService>,
    runtime: Handle,
}

impl MemberHandler {
    /// Must be called from within a tokio runtime
    pub fn new(store: Arc<dyn ZoneStore>, service: Arc<ZoneService>) -> Self {
        Self {
            store,
            service,
            runtime: Handle::current(),
        }
    }

    fn decode(member: &Member) -> Option<NodeMeta> {
        match member.meta() {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(node = %member.name, "ignoring member with unreadable metadata: {}", e);
                None
            }
        }
    }
}

impl MemberObserver for MemberHandler {
    fn notify_join(&self, member: &Member) {
        info!(node = %member.name, addr = %member.addr, "node joined");
        let Some(meta) = Self::decode(member) else { return };

        match meta.role {
            NodeRole::Management => {
                let store = self.store.clone();
                let name = member.name.clone();
                let raft_addr = SocketAddr::new(member.ip(), meta.raft_port).to_string();
                self.runtime.spawn(async move {
                    if let Err(e) = store.join(&name, &raft_addr).await {
                        warn!(node = %name, addr = %raft_addr, "problem joining distributed store: {}", e);
                    }
                });
            }
            NodeRole::Music => {
                let service = self.service.clone();
                let member = member.clone();
                self.runtime.spawn(async move {
                    service.handle_music_node_join(&member).await;
                });
            }
            NodeRole::Frontend => debug!(node = %member.name, "frontend node joined"),
        }
    }

    fn notify_leave(&self, member: &Member) {
        info!(node = %member.name, "node left");
        let Some(meta) = Self::decode(member) else { return };

        if meta.role == NodeRole::Music {
            let service = self.service.clone();
            let member = member.clone();
            self.runtime.spawn(async move {
                service.handle_music_node_leave(&member).await;
            });
        }
    }

    fn notify_update(&self, member: &Member) {
        info!(node = %member.name, "node updated");
    }
}
